//! HalApp CLI output primitives.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Terminal palette
pub mod colors {
    use console::Color;

    pub const CYAN: Color = Color::Color256(51);
    pub const MAGENTA: Color = Color::Color256(201);
    pub const VIOLET: Color = Color::Color256(135);
    pub const GREEN: Color = Color::Color256(82);
    pub const DIM: Color = Color::Color256(240);
}

pub mod symbols {
    pub const DIAMOND: &str = "\u{25C6}"; // ◆
    pub const DIAMOND_OUTLINE: &str = "\u{25C7}"; // ◇
    pub const TARGET_FILLED: &str = "\u{25C9}"; // ◉
    pub const TRIANGLE: &str = "\u{25B8}"; // ▸
    pub const DOT: &str = "\u{00B7}"; // ·
}

/// Print compact version header
pub fn print_compact_header(version: &str) {
    eprintln!(
        "  {} {} {}",
        style(symbols::DIAMOND).fg(colors::CYAN),
        style("halapp").fg(colors::CYAN).bold(),
        style(version).dim()
    );
}

/// Print a success message
pub fn success(msg: &str) {
    println!(
        "  {} {}",
        style(symbols::TARGET_FILLED).fg(colors::GREEN),
        msg
    );
}

/// Print an info message
pub fn info(msg: &str) {
    println!(
        "  {} {}",
        style(symbols::DIAMOND_OUTLINE).fg(colors::CYAN),
        msg
    );
}

/// Print a dim/secondary message
pub fn dim(msg: &str) {
    println!("  {}", style(msg).fg(colors::DIM));
}

/// Create a spinner; it draws on stderr so stdout stays pipeable.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let spinner_style = ProgressStyle::default_spinner()
        .tick_chars("\u{25CE}\u{25C9}\u{25CE}\u{25C9}") // ◎◉◎◉
        .template("  {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(spinner_style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(150));
    pb
}

/// Print a divider line
pub fn divider() {
    println!();
    let line = "\u{254C}".repeat(53); // ╌
    println!("  {}", style(line).fg(colors::DIM));
    println!();
}

/// Print a root aggregate in the tree
pub fn tree_root(name: &str, table: &str) {
    println!(
        "  {} {}  {}",
        style(symbols::TRIANGLE).fg(colors::CYAN),
        style(name).fg(colors::CYAN).bold(),
        style(table).dim()
    );
}

/// Print a nested aggregate in the tree
pub fn tree_item(depth: usize, name: &str, description: &str, is_last: bool) {
    let connector = if is_last {
        "\u{2570}\u{2500}\u{2500}" // ╰──
    } else {
        "\u{251C}\u{2500}\u{2500}" // ├──
    };
    println!(
        "  {}{}  {}   {}",
        "    ".repeat(depth.saturating_sub(1)),
        style(connector).fg(colors::DIM),
        style(name).fg(colors::CYAN),
        style(description).dim()
    );
}

/// Print one table summary line
pub fn table_line(table: &str, keys: usize, columns: usize) {
    println!(
        "  {}   {:16} {} keys {} {} columns",
        style(symbols::TRIANGLE).fg(colors::CYAN),
        style(table).bold(),
        keys,
        symbols::DOT,
        style(columns).fg(colors::VIOLET)
    );
}

/// Print timing information
pub fn timing(label: &str, duration_ms: u128) {
    println!(
        "  {} {} in {}ms",
        style(symbols::DIAMOND_OUTLINE).fg(colors::CYAN),
        label,
        duration_ms
    );
}

/// Print "Nope" error header (for check failures)
pub fn nope_header() {
    eprintln!();
    eprintln!(
        "  {} {}",
        style(symbols::DIAMOND).fg(colors::MAGENTA).bold(),
        style("Nope.").fg(colors::MAGENTA).bold()
    );
    eprintln!();
}

/// Print "Looking good" success for check
pub fn looking_good() {
    println!(
        "  {} {}",
        style(symbols::TARGET_FILLED).fg(colors::GREEN),
        style("Looking good.").bold()
    );
}
