use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static PACKAGE: Emoji<'_, '_> = Emoji("📦 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    println!(
        "\n{} {} {}\n",
        PACKAGE,
        style("silo-runner").bold().cyan(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
}

enum Row {
    Command(String, String),
    Status(String, String),
    Blank,
}

/// A titled block of aligned rows, printed in one go.
pub struct GuideSection {
    title: String,
    rows: Vec<Row>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows
            .push(Row::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.rows
            .push(Row::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.rows.push(Row::Blank);
        self
    }

    pub fn render(&self) -> Vec<String> {
        let width = self
            .rows
            .iter()
            .map(|row| match row {
                Row::Command(name, _) => name.len(),
                Row::Status(label, _) => label.len(),
                Row::Blank => 0,
            })
            .max()
            .unwrap_or(0);

        let mut lines = vec![format!("{}", style(&self.title).bold().underlined())];
        for row in &self.rows {
            lines.push(match row {
                Row::Command(name, description) => format!(
                    "  {} {}",
                    style(format!("{:<width$}", name, width = width)).green(),
                    description
                ),
                Row::Status(label, value) => format!(
                    "  {} {}: {}",
                    GEAR,
                    style(format!("{:<width$}", label, width = width)).bold().cyan(),
                    value
                ),
                Row::Blank => String::new(),
            });
        }
        lines
    }

    pub fn print(&self) {
        println!();
        for line in self.render() {
            println!("{}", line);
        }
    }
}
