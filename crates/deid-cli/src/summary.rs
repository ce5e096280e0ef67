use std::path::Path;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};

use deid_engine::StageResult;
use deid_model::{Stage, StageCounts};

use crate::commands::RunOutcome;

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

/// Progress bar over the items scheduled in one run.
pub struct Progress {
    bar: ProgressBar,
}

impl Progress {
    /// A bar of `total` items, drawn on stderr only when `visible`.
    pub fn new(total: usize, visible: bool) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }

    /// Advance on every item that reached a terminal stage.
    pub fn observe(&self, result: &StageResult) {
        if result.stage.is_terminal() {
            self.bar.inc(1);
            self.bar.set_message(format!("{} {}", result.id, result.stage));
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

pub fn print_summary(outcome: &RunOutcome) {
    let state = &outcome.state;
    println!("Run: {}", state.run_id);
    if let Some(previous) = &state.resumed_from {
        println!("Resumed from: {previous}");
    }
    if state.dry_run {
        println!("Dry run: no slide was de-identified or uploaded");
    }
    println!("Output: {}", state.config.out_dir.display());

    let counts = outcome.counts();
    let mut table = Table::new();
    table.set_header(vec![header_cell("Stage"), header_cell("Items")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    for stage in Stage::ALL {
        let count = stage_count(&counts, stage);
        table.add_row(vec![stage_cell(stage), count_cell(count, stage)]);
    }
    table.add_row(vec![
        Cell::new("total")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        Cell::new(counts.total).add_attribute(Attribute::Bold),
    ]);
    println!("{table}");

    if outcome.schedule.deferred > 0 {
        println!(
            "Deferred: {} item(s) left for a later run",
            outcome.schedule.deferred
        );
    }
    if let Some(report) = &outcome.resume
        && !report.regressions.is_empty()
    {
        println!(
            "Resume rolled back {} item(s) whose artifacts could not be confirmed",
            report.regressions.len()
        );
    }
    print_failures(outcome);
    print_reports(outcome);
}

fn print_failures(outcome: &RunOutcome) {
    let mut failed: Vec<_> = outcome
        .state
        .items
        .iter()
        .filter_map(|item| item.failure.as_ref().map(|failure| (item, failure)))
        .filter(|(item, _)| item.stage == Stage::Failed)
        .collect();
    if failed.is_empty() {
        return;
    }
    failed.sort_by_key(|(item, _)| item.index);

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Item"),
        header_cell("Stage"),
        header_cell("Kind"),
        header_cell("Error"),
    ]);
    apply_table_style(&mut table);
    for (item, failure) in failed {
        table.add_row(vec![
            Cell::new(&item.id),
            Cell::new(failure.stage),
            Cell::new(failure.kind).fg(Color::Red),
            Cell::new(&failure.message),
        ]);
    }
    eprintln!("Failures:");
    eprintln!("{table}");
}

fn print_reports(outcome: &RunOutcome) {
    let Some(reports) = &outcome.reports else {
        println!("Reports: existing run left untouched");
        return;
    };
    println!("Status: {}", reports.status.display());
    println!("Submission: {}", reports.submission.display());
    if let Some(path) = &reports.s3_manifest {
        println!("S3 manifest: {}", path.display());
    }
    println!("Run journal: {}", reports.run_journal.display());
}

pub fn print_validation(manifest: &Path, rows: usize) {
    println!("{}: {rows} valid row(s)", manifest.display());
}

fn stage_count(counts: &StageCounts, stage: Stage) -> usize {
    match stage {
        Stage::Pending => counts.pending,
        Stage::Deidentified => counts.deidentified,
        Stage::Uploaded => counts.uploaded,
        Stage::Done => counts.done,
        Stage::Failed => counts.failed,
    }
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn stage_cell(stage: Stage) -> Cell {
    let color = match stage {
        Stage::Done => Color::Green,
        Stage::Failed => Color::Red,
        _ => Color::Blue,
    };
    Cell::new(stage).fg(color)
}

fn count_cell(count: usize, stage: Stage) -> Cell {
    match (count, stage) {
        (0, _) => Cell::new(count).fg(Color::DarkGrey),
        (_, Stage::Failed) => Cell::new(count)
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        _ => Cell::new(count),
    }
}
