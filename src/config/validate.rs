// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ConfigFile, ImageSpec, Networking, RawConfigFile, Timeouts, TimeoutsSection,
};
use crate::errors::{NightcheckError, Result};
use crate::nodes::selector;

/// Upper bound on any configured duration.
const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::NightcheckError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;

        let timeouts = parse_timeouts(&raw.timeouts)?;
        let networking = Networking {
            bandwidth: raw.networking.bandwidth,
            ssh_backoff: parse_field("networking.ssh_backoff", &raw.networking.ssh_backoff)?,
        };

        Ok(ConfigFile {
            testbed: raw.testbed,
            timeouts,
            networking,
            images: raw.image,
            image_search_path: raw.images.search_path,
            mail: raw.mail,
            run: raw.run,
            commands: raw.commands,
        })
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_testbed(cfg)?;
    validate_images(&cfg.image)?;
    validate_networking(cfg)?;
    validate_mail(cfg)?;
    Ok(())
}

fn validate_testbed(cfg: &RawConfigFile) -> Result<()> {
    if cfg.testbed.principal.trim().is_empty() {
        return Err(NightcheckError::ConfigError(
            "[testbed].principal must not be empty".to_string(),
        ));
    }

    let nodes = selector::parse_selection(&[cfg.testbed.nodes.clone()], None)?;
    if nodes.is_empty() {
        return Err(NightcheckError::ConfigError(format!(
            "[testbed].nodes selects no node (got '{}')",
            cfg.testbed.nodes
        )));
    }
    Ok(())
}

fn validate_images(images: &[ImageSpec]) -> Result<()> {
    if images.is_empty() {
        return Err(NightcheckError::ConfigError(
            "config must contain at least one [[image]] entry".to_string(),
        ));
    }

    for image in images {
        if image.name.trim().is_empty() {
            return Err(NightcheckError::ConfigError(
                "[[image]] entry with an empty name".to_string(),
            ));
        }
        if image.markers.is_empty() {
            return Err(NightcheckError::ConfigError(format!(
                "image '{}' has no markers to check against",
                image.name
            )));
        }
        // Markers end up inside a single-quoted remote command.
        if let Some(bad) = image
            .markers
            .iter()
            .find(|m| m.is_empty() || m.contains('\'') || m.contains('|'))
        {
            return Err(NightcheckError::ConfigError(format!(
                "image '{}' has an invalid marker '{}'",
                image.name, bad
            )));
        }
    }
    Ok(())
}

fn validate_networking(cfg: &RawConfigFile) -> Result<()> {
    if cfg.networking.bandwidth == 0 {
        return Err(NightcheckError::ConfigError(
            "[networking].bandwidth must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_mail(cfg: &RawConfigFile) -> Result<()> {
    if cfg.mail.to.is_empty() {
        return Err(NightcheckError::ConfigError(
            "[mail].to must list at least one recipient".to_string(),
        ));
    }
    Ok(())
}

fn parse_timeouts(section: &TimeoutsSection) -> Result<Timeouts> {
    Ok(Timeouts {
        power: parse_field("timeouts.power", &section.power)?,
        power_check_delay: parse_field("timeouts.power_check_delay", &section.power_check_delay)?,
        load: parse_field("timeouts.load", &section.load)?,
        wait_ssh: parse_field("timeouts.wait_ssh", &section.wait_ssh)?,
        check_image: parse_field("timeouts.check_image", &section.check_image)?,
        status: parse_field("timeouts.status", &section.status)?,
    })
}

fn parse_field(field: &str, value: &str) -> Result<Duration> {
    let duration = parse_duration(value)
        .map_err(|e| NightcheckError::ConfigError(format!("{field}: {e}")))?;
    if duration.is_zero() {
        return Err(NightcheckError::ConfigError(format!(
            "{field} must be a non-zero duration (got '{value}')"
        )));
    }
    if duration > MAX_DURATION {
        return Err(NightcheckError::ConfigError(format!(
            "{field} must not exceed {}h (got '{value}')",
            MAX_DURATION.as_secs() / 3600
        )));
    }
    Ok(duration)
}
