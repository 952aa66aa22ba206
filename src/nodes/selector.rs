// src/nodes/selector.rs

//! Node selection syntax used on the command line and in `[testbed].nodes`.
//!
//! Accepted tokens (whitespace or comma separated):
//! - `12`, `fit12`, `reboot12`: a single node
//! - `1-5`, `fit01-fit05`: an inclusive range
//! - `all`: every node of the default selection
//! - `~4`, `~1-3`: remove nodes from what has been selected so far
//!
//! When no positive token is given (only negations, or nothing at all), the
//! default selection is the starting point.

use std::collections::BTreeSet;

use crate::errors::{NightcheckError, Result};
use crate::nodes::Selection;
use crate::types::NodeId;

/// Widest range a single token may expand to.
const MAX_RANGE_WIDTH: NodeId = 1024;

/// Build a [`Selection`] from selector arguments.
///
/// `defaults` backs the `all` keyword and the negation-only form; pass `None`
/// when parsing the default selection itself.
pub fn parse_selection(args: &[String], defaults: Option<&Selection>) -> Result<Selection> {
    let tokens: Vec<&str> = args
        .iter()
        .flat_map(|arg| arg.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|tok| !tok.is_empty())
        .collect();

    let has_positive = tokens.iter().any(|tok| !tok.starts_with('~'));

    let mut ids: BTreeSet<NodeId> = if has_positive {
        BTreeSet::new()
    } else {
        defaults.map(|d| d.iter().collect()).unwrap_or_default()
    };

    for tok in tokens {
        if let Some(negated) = tok.strip_prefix('~') {
            for id in parse_range(negated)? {
                ids.remove(&id);
            }
        } else if tok.eq_ignore_ascii_case("all") {
            let defaults = defaults.ok_or_else(|| {
                NightcheckError::MisformedRange("'all' needs a default selection".to_string())
            })?;
            ids.extend(defaults.iter());
        } else {
            ids.extend(parse_range(tok)?);
        }
    }

    Ok(ids.into_iter().collect())
}

fn parse_range(tok: &str) -> Result<Vec<NodeId>> {
    match tok.split_once('-') {
        Some((low, high)) => {
            let low = parse_id(low, tok)?;
            let high = parse_id(high, tok)?;
            if low > high {
                return Err(NightcheckError::MisformedRange(format!(
                    "'{tok}': range bounds are reversed"
                )));
            }
            if high - low >= MAX_RANGE_WIDTH {
                return Err(NightcheckError::MisformedRange(format!(
                    "'{tok}': range spans more than {MAX_RANGE_WIDTH} nodes"
                )));
            }
            Ok((low..=high).collect())
        }
        None => Ok(vec![parse_id(tok, tok)?]),
    }
}

/// Parse `7`, `07`, `fit07` or `reboot07`.
fn parse_id(part: &str, tok: &str) -> Result<NodeId> {
    let digits = part.trim().trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let id: NodeId = digits
        .parse()
        .map_err(|_| NightcheckError::MisformedRange(format!("'{tok}': not a node id")))?;
    if id == 0 {
        return Err(NightcheckError::MisformedRange(format!(
            "'{tok}': node ids start at 1"
        )));
    }
    Ok(id)
}
