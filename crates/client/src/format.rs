use std::time::Duration;

use hashforge_client_engine::JobOutcome;

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (count, ch) in s.chars().rev().enumerate() {
        if count != 0 && count % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.chars().rev().collect()
}

pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        return format!("{ms}ms");
    }

    if ms < 60_000 {
        let seconds = ms / 1000;
        let millis = ms % 1000;
        return format!("{seconds}.{millis:03}s");
    }

    if ms < 3_600_000 {
        let minutes = ms / 60_000;
        let seconds = (ms % 60_000) / 1000;
        return format!("{minutes}m{seconds:02}s");
    }

    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    format!("{hours}h{minutes:02}m{seconds:02}s")
}

pub fn format_hashrate(hashes_per_sec: u64) -> String {
    const UNITS: [&str; 5] = ["H/s", "kH/s", "MH/s", "GH/s", "TH/s"];
    let mut value = hashes_per_sec as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit + 1 < UNITS.len() {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        return format!("{hashes_per_sec} H/s");
    }
    format!("{value:.2} {}", UNITS[unit])
}

pub fn format_outcome_status(outcome: &JobOutcome) -> String {
    if let Some(err) = &outcome.error {
        return err.clone();
    }
    if outcome.cancelled {
        return "Cancelled".to_string();
    }
    if outcome.exhausted {
        return "Exhausted".to_string();
    }
    if outcome.verify_mismatch {
        return "Rejected locally (hash mismatch)".to_string();
    }
    match outcome.submit_accepted {
        Some(true) => "Accepted".to_string(),
        Some(false) => "Rejected".to_string(),
        None => "Unknown".to_string(),
    }
}

pub fn format_job_done_line(outcome: &JobOutcome) -> String {
    let status = format_outcome_status(outcome);
    let nonce = outcome
        .nonce
        .map(|n| format!(", Nonce: {n:#010x}"))
        .unwrap_or_default();
    format!(
        "Job: {}, Status: {status}{nonce}, Hashes: {}, Duration: {}",
        outcome.job.job_id,
        format_number(outcome.hashes),
        format_duration(Duration::from_millis(outcome.total_ms))
    )
}
