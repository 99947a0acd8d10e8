use crossterm::style::Stylize;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide color switch, flipped off by `--no-color`.
static COLOR_ENABLED: AtomicBool = AtomicBool::new(true);

pub fn disable_color() {
    COLOR_ENABLED.store(false, Ordering::Relaxed);
}

pub fn color_enabled() -> bool {
    COLOR_ENABLED.load(Ordering::Relaxed)
}

pub fn err_prefix() -> String {
    if color_enabled() {
        "ERR:".red().to_string()
    } else {
        "ERR:".to_string()
    }
}

pub fn warn_prefix() -> String {
    if color_enabled() {
        "WARN:".yellow().to_string()
    } else {
        "WARN:".to_string()
    }
}

pub fn hint_prefix() -> String {
    if color_enabled() {
        "HINT:".cyan().to_string()
    } else {
        "HINT:".to_string()
    }
}

pub fn address(addr: impl Display) -> String {
    if color_enabled() {
        addr.to_string().blue().to_string()
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_color_output_is_plain() {
        disable_color();
        assert_eq!(err_prefix(), "ERR:");
        assert_eq!(warn_prefix(), "WARN:");
        assert_eq!(hint_prefix(), "HINT:");
        assert_eq!(address("0x1"), "0x1");
    }
}
