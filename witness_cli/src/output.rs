//! Plain line output for non-interactive terminals

use crate::viewer::{Presenter, RenderedEntry, StatusClass, Waterfall};
use console::style;

/// Prints one line per finished request
pub struct LinePresenter {
    endpoint: String,
    connected: Option<bool>,
}

impl LinePresenter {
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            connected: None,
        }
    }
}

/// Styled summary line for a finished request
pub fn format_entry(entry: &RenderedEntry) -> String {
    let summary = &entry.summary;
    let line = summary.to_line();

    let line = if entry.had_error || summary.error.is_some() {
        style(line).red()
    } else {
        match summary.status_class {
            Some(StatusClass(2)) => style(line).green(),
            Some(StatusClass(3)) => style(line).cyan(),
            Some(StatusClass(4)) => style(line).yellow(),
            Some(_) => style(line).red(),
            None => style(line).white(),
        }
    };

    if entry.had_error {
        format!("{} {}", style("!").red().bold(), line)
    } else {
        line.to_string()
    }
}

impl Presenter for LinePresenter {
    fn connectivity_changed(&mut self, connected: bool) {
        if self.connected == Some(connected) {
            return;
        }
        self.connected = Some(connected);

        if connected {
            println!("{} {}", style("connected").green().bold(), self.endpoint);
        } else {
            println!("{} {}", style("connecting...").yellow(), self.endpoint);
        }
    }

    fn render_entry(&mut self, entry: RenderedEntry, _is_new: bool) {
        if entry.done {
            println!("{}", format_entry(&entry));
        }
    }

    fn update_waterfall(&mut self, _waterfall: &Waterfall) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::{RowHandle, SummaryLine};
    use witness_common::{RequestLog, ResponseLog, TraceRecord};

    #[test]
    fn test_format_entry() {
        console::set_colors_enabled(false);

        let record = TraceRecord {
            id: Some("a".to_string()),
            request_log: Some(RequestLog {
                method: "GET".to_string(),
                url: "http://localhost/health".to_string(),
                ..Default::default()
            }),
            response_log: Some(ResponseLog {
                status: "200 OK".to_string(),
                status_code: 200,
                content_length: 2,
                ..Default::default()
            }),
            duration: "1.2ms".to_string(),
            done: true,
            ..Default::default()
        };

        let mut entry = RenderedEntry {
            handle: RowHandle::new(0),
            id: "a".to_string(),
            had_error: false,
            done: true,
            summary: SummaryLine::from_record(&record),
            record,
        };

        assert_eq!(format_entry(&entry), "GET http://localhost/health 200 OK 2B 1.2ms");

        entry.had_error = true;
        assert_eq!(format_entry(&entry), "! GET http://localhost/health 200 OK 2B 1.2ms");
    }
}
