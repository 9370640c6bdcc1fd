fn required<F>(lookup: &F, name: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .with_context(|| format!("{name} is not set"))
}

fn expand_with_home(value: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(value);
    };
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

fn read_parsed<T>(name: &str, value: Option<String>) -> T
where
    T: std::str::FromStr + Default,
    T::Err: fmt::Display,
{
    let Some(value) = value else {
        return T::default();
    };
    value.parse().unwrap_or_else(|err| {
        tracing::warn!(variable = name, error = %err, "ignoring invalid value, using default");
        T::default()
    })
}

fn log_cycle(report: &CycleReport) {
    if report.cancelled {
        tracing::info!(scanned = report.scanned, "cycle cancelled");
    }
    if report.changed() > 0 || report.failed > 0 || report.scan_errors > 0 || report.evicted > 0 {
        tracing::info!(
            scanned = report.scanned,
            created = report.created,
            relinked = report.relinked,
            content_updated = report.content_updated,
            recreated = report.recreated,
            evicted = report.evicted,
            failed = report.failed,
            scan_errors = report.scan_errors,
            persisted = report.persisted,
            "cycle finished"
        );
    } else {
        tracing::debug!(scanned = report.scanned, "cycle finished, nothing to do");
    }
}
