use std::fmt;

use miette::{LabeledSpan, MietteHandlerOpts, Report, RgbColors, Severity};

use crate::span::Location;

/// An ordered bag of warnings and errors.
///
/// Every pass of the toolchain returns a `Messages` value alongside its
/// normal result instead of aborting on the first problem, so that a single
/// run can report as many diagnostics as possible.
#[derive(Default, Debug)]
pub struct Messages {
    msgs: Vec<Message>,
}

#[derive(Clone, Debug)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    pub loc: Option<Location>,
}

impl Messages {
    pub fn new() -> Self {
        Messages::default()
    }

    /// A bag holding a single error, for the common early-return case.
    pub fn from_error(text: impl Into<String>, loc: Option<Location>) -> Self {
        let mut messages = Messages::new();
        messages.err(text, loc);
        messages
    }

    pub fn err(&mut self, text: impl Into<String>, loc: Option<Location>) {
        self.msgs.push(Message {
            severity: Severity::Error,
            text: text.into(),
            loc,
        });
    }

    pub fn warn(&mut self, text: impl Into<String>, loc: Option<Location>) {
        self.msgs.push(Message {
            severity: Severity::Warning,
            text: text.into(),
            loc,
        });
    }

    pub fn extend(&mut self, other: Messages) -> &mut Self {
        self.msgs.extend(other.msgs);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.msgs.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.msgs
            .iter()
            .filter(|m| m.severity == Severity::Warning)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.msgs.iter()
    }

    /// Keep only the messages the predicate accepts. Used by warn-once
    /// categories.
    pub fn retain(&mut self, f: impl FnMut(&Message) -> bool) {
        self.msgs.retain(f);
    }

    /// Sort messages into source order. Messages without a location keep
    /// their relative position at the front.
    pub fn sort(&mut self) {
        self.msgs
            .sort_by_key(|m| m.loc.as_ref().map(|loc| loc.sort_key()));
    }

    /// Render every message to stderr as a miette report, in source order.
    pub fn print(&mut self) {
        self.sort();
        for msg in &self.msgs {
            eprintln!("{:?}", msg.as_report());
        }
    }
}

impl Message {
    /// Build a miette report with the source line labeled, in the style the
    /// rest of the toolchain uses for all diagnostics.
    pub fn as_report(&self) -> Report {
        let labels: Vec<LabeledSpan> = match &self.loc {
            Some(loc) => vec![LabeledSpan::underline(loc.span)],
            None => vec![],
        };
        let report = miette::miette!(
            severity = self.severity,
            labels = labels,
            "{}",
            self.text
        );
        match &self.loc {
            Some(loc) => report.with_source_code(
                miette::NamedSource::new(loc.file.path.as_ref(), loc.file.text.to_string())
                    .with_language("HERA"),
            ),
            None => report,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Advice => "Advice",
        };
        match &self.loc {
            Some(loc) => write!(
                f,
                "{}: {}, line {} col {} of {}",
                tag, self.text, loc.line, loc.column, loc.file.path
            ),
            None => write!(f, "{}: {}", tag, self.text),
        }
    }
}

/// Install the global miette hook, honoring `--no-color`.
pub fn install_report_handler(color: bool) {
    let _ = miette::set_hook(Box::new(move |_| {
        Box::new(
            MietteHandlerOpts::new()
                .color(color)
                .rgb_colors(RgbColors::Never)
                .context_lines(1)
                .build(),
        )
    }));
}
