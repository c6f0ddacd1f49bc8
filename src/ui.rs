use colored::*;
use terminal_size::{Width, Height, terminal_size};
use crate::auth::{AuthorizationPrompt, TokenInfo};

pub fn print_header(title: &str) {
    let (width, _) = terminal_size().unwrap_or((Width(80), Height(24)));
    let width = (width.0 as usize).min(100);

    let line = "─".repeat(width);
    println!("{}", line.black().bold());

    let name = "spotui".green().bold();
    let version = format!("v{}", env!("CARGO_PKG_VERSION")).black().bold();
    println!("  🎵 {} {}  {}", name, version, title.cyan());

    println!("{}", line.black().bold());
}

/// Default presenter for the interactive flow; the URL is printed, never opened
pub fn print_authorization_prompt(prompt: &AuthorizationPrompt) {
    println!();
    print_header("Spotify Authorization Required");
    println!("\n  Please visit this URL to authorize:\n");
    println!("  {}\n", prompt.authorization_url.underline());
    print_step(&format!("Waiting for callback on {}", prompt.callback_url));
    print_step(&format!("This will time out in {}s", prompt.timeout.as_secs()));
}

/// Same prompt on stderr, for commands whose stdout is machine-read
pub fn eprint_authorization_prompt(prompt: &AuthorizationPrompt) {
    eprintln!();
    eprintln!("  🎵 {}", "Spotify Authorization Required".cyan());
    eprintln!("\n  Please visit this URL to authorize:\n");
    eprintln!("  {}\n", prompt.authorization_url.underline());
    eprintln!("  {} Waiting for callback on {}", "•".green(), prompt.callback_url);
    eprintln!("  {} This will time out in {}s", "•".green(), prompt.timeout.as_secs());
}

pub fn print_token_info(info: &TokenInfo) {
    let validity = if info.valid { "valid".green() } else { "expired".red() };
    println!("  Token:        {}", validity);
    println!("  Expiry:       {}", info.expiry.to_rfc3339());
    if info.valid {
        println!("  Expires in:   {}m", info.expires_in.num_minutes());
    }
    println!(
        "  Refreshable:  {}",
        if info.has_refresh { "yes".green() } else { "no".yellow() }
    );
}

pub fn print_step(msg: &str) {
    println!("  {} {}", "•".green(), msg);
}

pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green().bold(), msg.green());
}

pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠️ ".yellow().bold(), msg.yellow());
}

pub fn print_error(msg: &str) {
    println!("  {} {}", "❌".red().bold(), msg.red());
}
