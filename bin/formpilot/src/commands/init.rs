use formpilot_core::Config;
use std::io::{self, Write};
use std::path::Path;

use super::config_path;

pub async fn run(explicit_config: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = config_path(explicit_config);

    if path.exists() && !force {
        print!("Config already exists. Overwrite? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    Config::default().save(&path)?;
    println!("✓ Created config: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to add an API key (or set OPENAI_API_KEY)", path.display());
    println!("  2. Run `formpilot doctor` to verify the setup");
    println!("  3. Run `formpilot apply <RESUME_URL> <JOB_URL>`");

    Ok(())
}
