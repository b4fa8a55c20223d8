const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Render a transfer as `"123.00 KB / 532.00 KB"`.
///
/// The unit is picked from `total`, so both numbers share it. An unknown
/// total (0) is rendered from the downloaded size alone.
pub fn transfer_message(downloaded: u64, total: u64) -> String {
    if total == 0 {
        return format!("{} / unknown", scaled(downloaded, unit_for(downloaded)));
    }
    let unit = unit_for(total);
    format!("{} / {}", scaled(downloaded, unit), scaled(total, unit))
}

/// Render a single size, e.g. `"1.50 MB"`.
pub fn human_size(size: u64) -> String {
    scaled(size, unit_for(size))
}

#[derive(Clone, Copy)]
enum Unit {
    B,
    Kb,
    Mb,
    Gb,
}

fn unit_for(size: u64) -> Unit {
    if size < KB {
        Unit::B
    } else if size < MB {
        Unit::Kb
    } else if size < GB {
        Unit::Mb
    } else {
        Unit::Gb
    }
}

fn scaled(size: u64, unit: Unit) -> String {
    match unit {
        Unit::B => format!("{size} B"),
        Unit::Kb => format!("{:.2} KB", size as f64 / KB as f64),
        Unit::Mb => format!("{:.2} MB", size as f64 / MB as f64),
        Unit::Gb => format!("{:.2} GB", size as f64 / GB as f64),
    }
}
