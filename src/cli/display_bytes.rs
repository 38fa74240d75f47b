use std::fmt;

const BYTE_UNITS: &[&str] = &["kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// A byte count in decimal units, e.g. `104.86 MB`.
pub struct DisplayBytes {
    unit: Option<&'static str>,
    value: f64,
}

impl fmt::Display for DisplayBytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.unit {
            Some(unit) => write!(f, "{:.2} {}", self.value, unit),
            None => write!(f, "{:.0} B", self.value),
        }
    }
}

impl DisplayBytes {
    pub fn new(value: u64) -> Self {
        let bytes = value as f64;

        match BYTE_UNITS
            .iter()
            .enumerate()
            .map(|(i, u)| (bytes / 1000_f64.powi(i as i32 + 1), *u))
            .take_while(|(x, _)| *x >= 1.0)
            .last()
        {
            Some((value, unit)) => Self {
                unit: Some(unit),
                value,
            },
            None => Self {
                unit: None,
                value: bytes,
            },
        }
    }
}
