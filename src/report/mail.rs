// src/report/mail.rs

//! Summary mail: subject line and HTML body rendered from a [`Report`].

use chrono::NaiveDate;

use crate::report::{Cell, Report};
use crate::types::ReportColumn;

/// A ready-to-send mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl MailMessage {
    /// Headers plus HTML body, as fed to `sendmail -t`.
    pub fn to_rfc822(&self) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=utf-8\r\n\r\n{}\r\n",
            self.from,
            self.to.join(", "),
            self.subject,
            self.html
        )
    }
}

pub fn subject(testbed: &str, report: &Report) -> String {
    if report.all_clear() {
        format!(
            "{testbed} nightly : all is fine on {} node(s)",
            report.node_count()
        )
    } else {
        format!(
            "{testbed} nightly : {} issue(s) on {} node(s)",
            report.issue_count(),
            report.node_count()
        )
    }
}

pub fn compose(
    testbed: &str,
    report: &Report,
    from: &str,
    to: &[String],
    date: NaiveDate,
) -> MailMessage {
    MailMessage {
        from: from.to_string(),
        to: to.to_vec(),
        subject: subject(testbed, report),
        html: render_html(report, date),
    }
}

fn cell_style(cell: Cell) -> (&'static str, &'static str, &'static str) {
    match cell {
        Cell::Green => ("32px Arial, Tahoma, Sans-serif", "#42c944", "&#8226;"),
        Cell::Red => ("18px Arial, Tahoma, Sans-serif", "red", "&#215;"),
        Cell::Gray => ("18px Arial, Tahoma, Sans-serif", "gray", "&#65110;"),
    }
}

fn header_line(report: &Report, date: &str) -> String {
    format!(
        "<p>On {date}<br/>Report on {} nodes<br/>Detected {} issues.</p>",
        report.node_count(),
        report.issue_count()
    )
}

fn summary_table(report: &Report, date: &str) -> String {
    if report.all_clear() {
        return format!(
            "<tr><td>All {} nodes were found to be fine.</td></tr>",
            report.node_count()
        );
    }

    let mut out = format!(
        "<tr>\n<td style=\"width: 40px; text-align: center;\"><h5>\
         <span style=\"background:#f0ad4e; color:#fff; padding:4px; border-radius: 5px;\">{date}</span>\
         </h5></td>\n"
    );
    for column in ReportColumn::ALL {
        out.push_str(&format!(
            "<td style=\"font:11px Arial, Tahoma, Sans-serif; width: 40px; text-align: center;\">{}</td>\n",
            column.title()
        ));
    }
    out.push_str("</tr>\n");

    for row in report.failed_rows() {
        out.push_str(&format!(
            "<tr>\n<td><span class=\"node\"><span class=\"id\">{}</span></span></td>",
            row.node
        ));
        for cell in row.cells {
            let (font, color, tick) = cell_style(cell);
            out.push_str(&format!(
                "<td style=\"text-align: center; font:{font}; color:{color}\">{tick}</td>"
            ));
        }
        out.push_str("\n</tr>\n");
    }
    out
}

pub fn render_html(report: &Report, date: NaiveDate) -> String {
    let date = date.format("%d/%m/%Y").to_string();
    format!(
        r#"<!DOCTYPE html><html lang="en">
<head>
 <meta charset="utf-8">
 <style>
td {{ font:15px helveticaneue, Arial, Tahoma, Sans-serif; }}
td>span.node {{ border-radius: 50%; border: 2px solid #525252; width: 30px; height: 30px;
  line-height: 30px; display: block; text-align: center; }}
td>span.id {{ color: #525252; }}
 </style>
</head>
<body style="font:14px helveticaneue, Arial, Tahoma, Sans-serif; margin: 0;">
{}
 <table style="padding: 10px;">
{}
 </table>
</body>
</html>"#,
        header_line(report, &date),
        summary_table(report, &date)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::FailureMap;
    use crate::types::Reason;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn subject_lines() {
        let clear = Report::build(&[1, 2, 3], &FailureMap::new());
        assert_eq!(subject("R2lab", &clear), "R2lab nightly : all is fine on 3 node(s)");

        let failures: FailureMap = [(2, Reason::WontSsh)].into_iter().collect();
        let report = Report::build(&[1, 2, 3], &failures);
        assert_eq!(subject("R2lab", &report), "R2lab nightly : 1 issue(s) on 3 node(s)");
    }

    #[test]
    fn html_lists_failed_nodes_only() {
        let failures: FailureMap = [(30, Reason::WontTurnOn), (37, Reason::DidNotLoad)]
            .into_iter()
            .collect();
        let report = Report::build(&[1, 30, 37], &failures);
        let html = render_html(&report, date());

        assert!(html.contains("On 07/03/2024"));
        assert!(html.contains("Detected 2 issues."));
        assert!(html.contains(">30<"));
        assert!(html.contains(">37<"));
        assert!(!html.contains(">1<"));
        assert_eq!(html.matches("color:red").count(), 2);
    }

    #[test]
    fn html_all_fine() {
        let report = Report::build(&[1, 2], &FailureMap::new());
        let html = render_html(&report, date());
        assert!(html.contains("All 2 nodes were found to be fine."));
    }

    #[test]
    fn rfc822_headers() {
        let report = Report::build(&[1], &FailureMap::new());
        let to = vec!["a@x".to_string(), "b@x".to_string()];
        let msg = compose("R2lab", &report, "n@x", &to, date());
        let text = msg.to_rfc822();
        assert!(text.starts_with("From: n@x\r\nTo: a@x, b@x\r\nSubject: R2lab nightly"));
        assert!(text.contains("Content-Type: text/html"));
    }
}
