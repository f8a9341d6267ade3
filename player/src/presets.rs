//! Built-in camera presets

/// Name and URL of every known camera.
pub const PRESETS: &[(&str, &str)] = &[
    ("boat1", "rtsp://60.205.13.156:8554/vrx_boat1"),
    ("boat2", "rtsp://60.205.13.156:8554/vrx_boat2"),
    ("boat3", "rtsp://60.205.13.156:8554/vrx_boat3"),
];

/// Look up a preset by name (case-insensitive, surrounding space ignored).
pub fn lookup(name: &str) -> Option<&'static str> {
    let name = name.trim();
    PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, url)| *url)
}

pub fn names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}
