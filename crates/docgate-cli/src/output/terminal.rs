//! Terminal output formatter

use super::FormatOptions;
use docgate_core::{AnswerEnvelope, AnswerStatus, AuditEvent, ConfidenceLevel, RoleDescription};
use std::io::{self, IsTerminal, Write};
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

fn color_choice() -> ColorChoice {
    if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn level_color(level: ConfidenceLevel) -> Color {
    match level {
        ConfidenceLevel::VeryHigh | ConfidenceLevel::High => Color::Green,
        ConfidenceLevel::Medium => Color::Yellow,
        ConfidenceLevel::Low | ConfidenceLevel::VeryLow => Color::Red,
    }
}

pub fn print_answer(envelope: &AnswerEnvelope, options: &FormatOptions) -> io::Result<()> {
    let writer = BufferWriter::stdout(color_choice());
    let mut out = writer.buffer();

    writeln!(out, "{}", envelope.answer.trim_end())?;

    if envelope.status != AnswerStatus::Ok {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_dimmed(true))?;
        write!(out, "status: {}", envelope.status.as_str())?;
        if let Some(ref id) = envelope.correlation_id {
            write!(out, " (reference {})", id)?;
        }
        writeln!(out)?;
        out.reset()?;
        return writer.print(&out);
    }

    if !envelope.sources.is_empty() {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(out, "Sources:")?;
        out.reset()?;
        for source in &envelope.sources {
            let cited = if envelope.citations.contains(&source.id) {
                "*"
            } else {
                " "
            };
            writeln!(
                out,
                " {} {:>3}% {} ({}, {})",
                cited,
                (source.relevance_score * 100.0).round() as u32,
                source.id,
                source.department,
                source.source_file
            )?;
            if options.full {
                writeln!(out, "         {}", source.preview)?;
            }
        }
    }

    let confidence = &envelope.confidence;
    writeln!(out)?;
    write!(out, "Confidence: ")?;
    out.set_color(ColorSpec::new().set_fg(Some(level_color(confidence.level))))?;
    write!(out, "{:.0}% {}", confidence.overall, confidence.level.as_str())?;
    out.reset()?;
    writeln!(out)?;

    if let Some(ref warning) = confidence.warning {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        writeln!(out, "Warning: {}", warning)?;
        out.reset()?;
    }
    if envelope.degraded {
        writeln!(out, "Note: sources are in retrieval order (relevance model unavailable)")?;
    }
    if !envelope.invalid_citations.is_empty() {
        writeln!(
            out,
            "Ignored citations: {}",
            envelope.invalid_citations.join(", ")
        )?;
    }

    writer.print(&out)
}

pub fn format_role(description: &RoleDescription) -> String {
    let mut output = String::new();

    match description.canonical {
        Some(ref canonical) if canonical != &description.requested => {
            output.push_str(&format!("Role:        {} (as {})\n", canonical, description.requested));
        }
        Some(ref canonical) => output.push_str(&format!("Role:        {}\n", canonical)),
        None => {
            output.push_str(&format!(
                "Role:        {} (unknown, no access)\n",
                description.requested
            ));
            return output;
        }
    }

    if !description.inherited_roles.is_empty() {
        let inherited: Vec<&str> = description.inherited_roles.iter().map(String::as_str).collect();
        output.push_str(&format!("Inherits:    {}\n", inherited.join(", ")));
    }

    let permissions: Vec<&str> = description
        .effective
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();
    output.push_str(&format!("Permissions: {}\n", permissions.join(", ")));

    output.push_str("Partitions:\n");
    for partition in &description.effective.accessible_partitions {
        output.push_str(&format!("  {}\n", partition));
    }
    output
}

pub fn format_audit_event(event: &AuditEvent) -> String {
    let mut line = format!(
        "{} {} {:<10} {:<16} {:<15} {:<18}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.correlation_id.chars().take(8).collect::<String>(),
        event.username,
        event.role,
        event.action.as_str(),
        event.decision.as_str()
    );
    if !event.chunk_ids_touched.is_empty() {
        line.push_str(&format!(" [{}]", event.chunk_ids_touched.join(",")));
    }
    if let Some(ref detail) = event.detail {
        line.push_str(&format!(" {}", detail));
    }
    line
}
