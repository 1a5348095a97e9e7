use crate::dump::{DumpDigest, DumpSummary, RecoveryReport, ResumeState};
use crate::optical::TrackDescriptor;
use crate::utils::{format_bytes, format_duration, format_rate};
use chrono::Local;

/// End-of-run summary; printed after every run, aborted ones included.
pub fn display_summary(summary: &DumpSummary) {
    println!("\nDump Summary");
    println!("{:-<60}", "");
    if summary.block_size == 0 {
        println!(
            "  {:<22} {} sectors of mixed sizes ({})",
            "Target:",
            summary.total_blocks,
            format_bytes(summary.total_bytes)
        );
    } else {
        println!(
            "  {:<22} {} blocks of {} bytes ({})",
            "Target:",
            summary.total_blocks,
            summary.block_size,
            format_bytes(summary.total_bytes)
        );
    }
    println!("  {:<22} {}", "Burst size:", summary.burst_size);
    println!("  {:<22} {}", "Blocks read:", summary.blocks_read);
    println!("  {:<22} {}", "Unrecoverable:", summary.blocks_unrecoverable);
    if let Some(captured) = summary.lead_in_captured {
        println!("  {:<22} {} sectors", "Lead-in captured:", captured);
    }
    println!(
        "  {:<22} min {} / max {} / avg {}",
        "Throughput:",
        format_rate(summary.min_rate_mib_s),
        format_rate(summary.max_rate_mib_s),
        format_rate(summary.avg_rate_mib_s)
    );
    println!(
        "  {:<22} imaging {}, recovery {}, checksum {}",
        "Stage time:",
        format_duration(summary.imaging_time.as_secs_f64()),
        format_duration(summary.recovery_time.as_secs_f64()),
        format_duration(summary.checksum_time.as_secs_f64())
    );
    println!(
        "  {:<22} {}",
        "Elapsed:",
        format_duration(summary.elapsed.as_secs_f64())
    );

    if summary.cancelled {
        println!("  Cancelled, progress saved for the next run");
    }
    if let Some(reason) = &summary.aborted {
        println!("  Aborted: {}", reason);
    }
}

pub fn display_recovery(report: &RecoveryReport) {
    if report.passes_run == 0 && report.trimmed == 0 && report.remaining == 0 {
        return;
    }
    println!("\nRecovery");
    println!(
        "  {:<22} {} (trim {}), {} passes",
        "Recovered:", report.recovered, report.trimmed, report.passes_run
    );
    println!("  {:<22} {}", "Still unreadable:", report.remaining);
    if report.persistent_engaged {
        println!("  Persistent recovery mode was used");
    }
    for error in &report.mode_errors {
        println!("  Mode page error: {}", error);
    }
    if let Some(error) = &report.mode_restore_error {
        println!("  WARNING: drive error recovery settings not restored: {}", error);
    }
}

pub fn display_digest(digest: &DumpDigest) {
    println!("\nChecksums ({})", format_bytes(digest.bytes));
    for (name, value) in &digest.values {
        println!("  {:<8} {}", name, value);
    }
}

pub fn display_tracks(tracks: &[TrackDescriptor]) {
    println!("\n{:>5} {:>7} {:>10} {:>10}  {:<16} {:>6}", "Track", "Session", "Start", "End", "Type", "Bytes");
    println!("{:-<62}", "");
    for track in tracks {
        println!(
            "{:>5} {:>7} {:>10} {:>10}  {:<16} {:>6}",
            track.sequence,
            track.session,
            track.start,
            track.end,
            track.kind.to_string(),
            track.layout.stride()
        );
    }
}

/// Progress summary of a resume file
pub fn display_resume_info(state: &ResumeState) {
    let total = state.total_blocks();
    let captured = state.captured().block_count();
    let percent = if total == 0 {
        0.0
    } else {
        captured as f64 * 100.0 / total as f64
    };

    println!("Resume State");
    println!("{:-<60}", "");
    println!("  {:<22} {}", "Next block:", state.next_block);
    println!("  {:<22} {}", "Last block:", state.last_block);
    println!("  {:<22} {}", "Removable:", state.removable);
    println!(
        "  {:<22} {} of {} ({:.2}%)",
        "Captured blocks:", captured, total, percent
    );
    println!("  {:<22} {}", "Bad blocks:", state.bad_blocks.len());
    if let Some(label) = &state.media_label {
        println!("  {:<22} {}", "Media label:", label);
    }
    println!(
        "  {:<22} {}",
        "Last updated:",
        state.updated.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  {:<22} {}",
        "Status:",
        if state.is_complete() { "complete" } else { "incomplete" }
    );

    for (index, attempt) in state.tries.iter().enumerate() {
        println!(
            "\n  Attempt {}: {} {} (S/N {}), {} {}",
            index + 1,
            attempt.manufacturer,
            attempt.model,
            attempt.serial,
            attempt.software.name,
            attempt.software.version
        );
        println!(
            "    {} blocks in {} extents, last used {}",
            attempt.extents.block_count(),
            attempt.extents.range_count(),
            attempt.last_used.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
    }

    if !state.bad_blocks.is_empty() {
        let preview: Vec<String> = state
            .bad_blocks
            .iter()
            .take(16)
            .map(|b| b.to_string())
            .collect();
        let more = state.bad_blocks.len().saturating_sub(preview.len());
        print!("\n  Bad blocks: {}", preview.join(", "));
        if more > 0 {
            print!(" ... ({} more)", more);
        }
        println!();
    }
}
