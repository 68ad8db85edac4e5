//! `banter onboard`: First-time setup.

use banter_config::BotConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = BotConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Banter — First-Time Setup");
    println!("=========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, BotConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Set DISCORD_TOKEN and OPENROUTER_API_KEY (or add them to .env)");
    println!("   2. List your FAQ channels under [knowledge].channel_names");
    println!("   3. Try: banter search \"when is the mint\"");
    println!("   4. Run: banter run\n");

    Ok(())
}
