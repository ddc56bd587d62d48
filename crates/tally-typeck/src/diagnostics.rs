//! Ariadne-based rendering for type errors.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use tally_common::Span;
use tally_rdt::Rdt;

use crate::error::TypeError;

// ── Error Codes ────────────────────────────────────────────────────────

pub fn error_code(err: &TypeError) -> &'static str {
    match err {
        TypeError::OperandMismatch { .. } => "E0101",
        TypeError::InvalidOperand { .. } => "E0102",
        TypeError::ConditionNotBoolean { .. } => "E0103",
        TypeError::BranchMismatch { .. } => "E0104",
        TypeError::UnknownField { .. } | TypeError::NotAnObject { .. } => "E0105",
        TypeError::NotAFunction { .. } => "E0106",
        TypeError::ArityMismatch { .. } => "E0107",
        TypeError::ArgumentMismatch { .. } => "E0108",
        TypeError::UnknownType { .. } => "E0109",
        TypeError::ContextOutsideDefinition { .. } | TypeError::UnknownContext { .. } => "E0110",
        TypeError::NotATable { .. } => "E0111",
        TypeError::UnresolvedIdentifier { .. } => "E0112",
        TypeError::NoFixedPoint { .. } => "E0113",
        TypeError::Unresolved { .. } => "E0114",
        TypeError::Structural(_) => "E0001",
    }
}

fn label_message(err: &TypeError) -> Option<String> {
    match err {
        TypeError::InvalidOperand { found, .. } => Some(format!("this is {}", found)),
        TypeError::ConditionNotBoolean { found, .. } => Some(format!("found {}", found)),
        TypeError::ArgumentMismatch { expected, .. } => Some(format!("expected {}", expected)),
        TypeError::UnknownField { ty, .. } => Some(format!("on {}", ty)),
        _ => None,
    }
}

// ── Rendering ──────────────────────────────────────────────────────────

/// Renders one report. Without a span the report points at the start of
/// the source and carries no label.
pub fn render_report(
    code: &str,
    message: &str,
    span: Option<Span>,
    label: Option<&str>,
    source: &str,
    filename: &str,
) -> String {
    let config = Config::default().with_color(false);
    let range: Range<usize> = match span {
        Some(span) => span.to_range(source.len()),
        None => 0..0,
    };

    let mut builder = Report::build(ReportKind::Error, range.clone())
        .with_code(code)
        .with_message(message)
        .with_config(config);
    if span.is_some() {
        builder.add_label(
            Label::new(range)
                .with_message(label.unwrap_or(message))
                .with_color(Color::Red),
        );
    } else {
        builder = builder.with_note(format!("in {}", filename));
    }

    let mut buf = Vec::new();
    match builder.finish().write(Source::from(source), &mut buf) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => format!("error[{}]: {}", code, message),
    }
}

/// Renders a type error against the source it was compiled from.
pub fn render_diagnostic(err: &TypeError, rdt: &Rdt, source: &str, filename: &str) -> String {
    let label = label_message(err);
    render_report(
        error_code(err),
        &err.to_string(),
        err.span(rdt),
        label.as_deref(),
        source,
        filename,
    )
}
