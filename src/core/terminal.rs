use console::{style, Emoji};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

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

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_banner() {
    println!("\n{}", style("flixql").bold().magenta());
    println!(
        "{}\n",
        style("Ask the Netflix catalog anything, in plain language.").dim()
    );
}

/// A titled block of commands for the help screen.
pub struct GuideSection {
    title: String,
    commands: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, blurb: &str) -> Self {
        self.commands.push((name.to_string(), blurb.to_string()));
        self
    }

    pub fn print(self) {
        println!(" {}", style(&self.title).bold().underlined());
        for (name, blurb) in &self.commands {
            println!("   {:<12} {}", style(name).green(), blurb);
        }
        println!();
    }
}
