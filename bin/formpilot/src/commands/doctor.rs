use formpilot_browser::{find_browser_binary, list_available_browsers, BrowserEngine};
use formpilot_core::Config;
use std::path::Path;

use super::{config_path, load_config};

/// Run environment diagnostics.
pub async fn run(explicit_config: Option<&Path>) -> anyhow::Result<()> {
    println!();
    println!("🩺 formpilot doctor — Environment Diagnostics");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("📋 Configuration");
    let path = config_path(explicit_config);
    if path.exists() {
        print_ok("Config file exists", &path.display().to_string());
        ok_count += 1;
    } else {
        print_warn("Config file not found", "Using defaults; run `formpilot init` to create one");
        warn_count += 1;
    }

    let config = match load_config(explicit_config) {
        Ok(config) => config,
        Err(e) => {
            print_err("Config file is invalid", &e.to_string());
            err_count += 1;
            Config::default()
        }
    };

    if let Some((name, _)) = config.get_api_key() {
        print_ok("API key configured", &format!("Active provider: {}", name));
        ok_count += 1;
    } else {
        print_err(
            "No API key configured",
            "Set OPENAI_API_KEY or add a provider key to config.json",
        );
        err_count += 1;
    }
    println!("  Model: {}", config.llm.model);
    println!();

    // --- 2. Browser ---
    println!("🌐 Browser");
    let engine = BrowserEngine::parse(&config.browser.engine);
    match config.browser.executable.as_deref() {
        Some(exe) if Path::new(exe).exists() => {
            print_ok("Configured executable", exe);
            ok_count += 1;
        }
        Some(exe) => {
            print_err("Configured executable not found", exe);
            err_count += 1;
        }
        None => match find_browser_binary(engine) {
            Some(bin) => {
                print_ok(&format!("{} found", engine.name()), &bin);
                ok_count += 1;
            }
            None => {
                print_err(
                    &format!("{} not found", engine.name()),
                    "Install Chrome/Chromium or set browser.executable",
                );
                err_count += 1;
            }
        },
    }
    for (other, bin) in list_available_browsers() {
        if other != engine {
            println!("  Also available: {} ({})", other.name(), bin);
        }
    }
    println!(
        "  Mode: {}",
        if config.browser.headless { "headless" } else { "headed" }
    );
    println!();

    // --- 3. Output ---
    println!("📁 Output");
    let shots = config.output.screenshots_dir();
    match std::fs::create_dir_all(&shots) {
        Ok(()) => {
            print_ok("Screenshot directory writable", &shots.display().to_string());
            ok_count += 1;
        }
        Err(e) => {
            print_err("Screenshot directory not writable", &e.to_string());
            err_count += 1;
        }
    }
    let temp_root = config.output.temp_root();
    let probe = temp_root.join(".formpilot_doctor");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            print_ok("Temp root writable", &temp_root.display().to_string());
            ok_count += 1;
        }
        Err(e) => {
            print_err("Temp root not writable", &e.to_string());
            err_count += 1;
        }
    }
    println!();

    println!("================================");
    println!(
        "Summary: {} ok, {} warnings, {} errors",
        ok_count, warn_count, err_count
    );
    if err_count == 0 {
        println!("✅ Ready to apply.");
    } else {
        println!("❌ Fix the errors above before running `formpilot apply`.");
    }
    println!();

    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} — {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}
