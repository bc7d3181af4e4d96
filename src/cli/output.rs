//! CLI output: text rendering of library results and error mapping.

use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::checkpoint::{resume_message, QueueCheckpoint};
use crate::progress::ProgressEvent;
use crate::queue::{GenerationQueue, QueueStatus, RunOutcome, RunReport, ShotOutcome};
use crate::shot::{ShotSpec, ShotStatus};
use crate::variation::{GrammarConfig, VariationParse};

/// Map errors to a string for CLI output, including the context chain.
pub fn map_error(e: &anyhow::Error) -> String {
    format!("Error: {:#}", e)
}

fn paint_queue_status(status: QueueStatus) -> String {
    match status {
        QueueStatus::Completed => status.as_str().green().to_string(),
        QueueStatus::Failed => status.as_str().red().to_string(),
        QueueStatus::Paused => status.as_str().yellow().to_string(),
        QueueStatus::Processing => status.as_str().cyan().to_string(),
        QueueStatus::Pending => status.as_str().dimmed().to_string(),
    }
}

fn paint_shot_status(status: ShotStatus) -> String {
    match status {
        ShotStatus::Completed => status.as_str().green().to_string(),
        ShotStatus::Failed => status.as_str().red().to_string(),
        ShotStatus::Generating => status.as_str().cyan().to_string(),
        ShotStatus::Ready => status.as_str().to_string(),
    }
}

pub fn format_parse(prompt: &str, parsed: &VariationParse) -> String {
    if !parsed.is_valid {
        let mut out = format!(
            "{} {}",
            "invalid:".red().bold(),
            parsed.error_message().unwrap_or_default()
        );
        if let Some(suggestion) = &parsed.suggestion {
            out.push_str(&format!("\nsuggestion: {}", suggestion));
        }
        out.push_str(&format!(
            "\nwill dispatch as 1 literal prompt: {}",
            prompt
        ));
        return out;
    }

    let mut out = format!("{} expansion(s)", parsed.total_count.bold());
    for (index, expanded) in parsed.expanded_prompts.iter().enumerate() {
        out.push_str(&format!("\n  {:>3}. {}", index + 1, expanded));
    }
    if parsed.is_truncated() {
        out.push_str(&format!(
            "\n  ... {} more",
            parsed.total_count - parsed.expanded_prompts.len()
        ));
    }
    out
}

pub fn format_shots_table(shots: &[ShotSpec], grammar: &GrammarConfig) -> String {
    if shots.is_empty() {
        return "No shots.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Seq", "Shot", "Status", "Outputs", "Prompt", "Error"]);
    for shot in shots {
        table.add_row(vec![
            shot.sequence_number.to_string(),
            shot.id.clone(),
            paint_shot_status(shot.status),
            shot.fan_out(grammar).to_string(),
            shot.prompt_template.clone(),
            shot.error_message.clone().unwrap_or_default(),
        ]);
    }
    table.to_string()
}

pub fn format_queue(queue: &GenerationQueue) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["Queue".to_string(), queue.id.clone()]);
    table.add_row(vec!["Project".to_string(), queue.project_id.clone()]);
    table.add_row(vec!["Status".to_string(), paint_queue_status(queue.status)]);
    table.add_row(vec![
        "Shots".to_string(),
        format!("{}/{}", queue.current_shot_index.min(queue.shot_ids.len()), queue.shot_ids.len()),
    ]);
    table.add_row(vec!["Progress".to_string(), format!("{:.1}%", queue.progress)]);
    if let Some(error) = &queue.error_message {
        table.add_row(vec!["Error".to_string(), error.red().to_string()]);
    }
    table.to_string()
}

pub fn format_queue_list(queues: &[GenerationQueue]) -> String {
    if queues.is_empty() {
        return "No queues.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Queue", "Project", "Status", "Shots", "Progress"]);
    for queue in queues {
        table.add_row(vec![
            queue.id.clone(),
            queue.project_id.clone(),
            paint_queue_status(queue.status),
            format!("{}/{}", queue.current_shot_index.min(queue.shot_ids.len()), queue.shot_ids.len()),
            format!("{:.1}%", queue.progress),
        ]);
    }
    table.to_string()
}

pub fn format_run_report(report: &RunReport) -> String {
    let headline = match &report.outcome {
        RunOutcome::Completed => "completed".green().bold().to_string(),
        RunOutcome::Paused => "paused".yellow().bold().to_string(),
        RunOutcome::Cancelled => "cancelled".yellow().bold().to_string(),
        RunOutcome::Failed { message } => format!("{} {}", "failed:".red().bold(), message),
    };
    let mut out = format!(
        "Queue {} {}\n{} of {} output(s) rendered, {} failed, progress {:.1}%",
        report.queue_id,
        headline,
        report.outputs_succeeded,
        report.total_outputs,
        report.outputs_failed,
        report.progress
    );
    for shot in report.failed_shots() {
        if let ShotOutcome::Failed { error, .. } = &shot.outcome {
            out.push_str(&format!("\n  {} {}: {}", "x".red(), shot.shot_id, error));
        }
    }
    if matches!(
        report.outcome,
        RunOutcome::Paused | RunOutcome::Cancelled | RunOutcome::Failed { .. }
    ) {
        out.push_str(&format!(
            "\nResume with: shotqueue resume --queue {}",
            report.queue_id
        ));
    }
    out
}

pub fn format_shot_outcome(shot_id: &str, outcome: &ShotOutcome) -> String {
    match outcome {
        ShotOutcome::Completed { result_refs } => format!(
            "Shot {} {} ({} output(s))",
            shot_id,
            "completed".green(),
            result_refs.len()
        ),
        ShotOutcome::Failed { error, .. } => {
            format!("Shot {} {}: {}", shot_id, "failed".red(), error)
        }
        ShotOutcome::Cancelled => format!("Shot {} {}", shot_id, "cancelled".yellow()),
    }
}

pub fn format_checkpoint(checkpoint: Option<&QueueCheckpoint>, fresh: bool) -> String {
    let Some(checkpoint) = checkpoint else {
        return "No checkpoint.".to_string();
    };
    let freshness = if fresh {
        "fresh".green().to_string()
    } else {
        "stale".red().to_string()
    };
    format!(
        "Checkpoint for queue {} (project {}), {}\n{}",
        checkpoint.queue_id,
        checkpoint.project_id,
        freshness,
        resume_message(checkpoint)
    )
}

pub fn format_events(events: &[ProgressEvent]) -> String {
    if events.is_empty() {
        return "No events.".to_string();
    }
    events
        .iter()
        .map(|event| format!("{:>5} {} {} {}", event.seq, event.ts, event.event_type, event.data))
        .collect::<Vec<_>>()
        .join("\n")
}
