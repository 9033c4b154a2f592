//! Best-effort host resource stats for the heartbeat payload. Read
//! directly from `/proc` and `df` rather than pulling in a system-stats
//! crate for three numbers; any read failure degrades to `None` instead
//! of failing the heartbeat.

pub fn cpu_percent() -> Option<f32> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    let one_min: f32 = loadavg.split_whitespace().next()?.parse().ok()?;
    let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f32;
    Some((one_min / cores * 100.0).min(100.0))
}

pub fn mem_percent() -> Option<f32> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb(rest);
        }
    }
    let (total, available) = (total?, available?);
    if total == 0.0 {
        return None;
    }
    Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
}

pub fn disk_percent(path: &str) -> Option<f32> {
    let output = std::process::Command::new("df").args(["-P", path]).output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().nth(1)?;
    let percent_field = line.split_whitespace().nth(4)?;
    percent_field.trim_end_matches('%').parse().ok()
}

fn parse_kb(rest: &str) -> Option<f32> {
    rest.trim().split_whitespace().next()?.parse().ok()
}
