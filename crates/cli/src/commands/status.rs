//! `banter status`: Show the effective configuration.

use banter_config::BotConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = BotConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let on_off = |b: bool| if b { "enabled" } else { "disabled" };

    println!("Banter Status");
    println!("=============");
    println!("  Config dir:    {}", BotConfig::config_dir().display());
    println!("  Discord token: {}", if config.discord.token.is_some() { "set" } else { "missing" });
    println!(
        "  Allowlist:     {}",
        if config.discord.channel_allowlist.is_empty() {
            "all text channels".to_string()
        } else {
            config.discord.channel_allowlist.join(", ")
        }
    );
    println!("  Endpoint:      {}", config.provider.base_url);
    println!("  Model:         {}", config.provider.model);
    println!("  Fallback:      {}", config.provider.model_fallback.as_deref().unwrap_or("none"));
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Input budget:  {} tokens", config.provider.max_input_tokens);
    println!(
        "  Knowledge:     {} by name, {} by id, refresh {}",
        config.knowledge.channel_names.len(),
        config.knowledge.channel_ids.len(),
        if config.knowledge.refresh_minutes == 0 {
            "off".to_string()
        } else {
            format!("every {}m", config.knowledge.refresh_minutes)
        }
    );
    println!(
        "  Reply chance:  {:.2} ({:.2} for questions)",
        config.behaviour.reply_chance, config.behaviour.reply_chance_question
    );
    println!(
        "  Starters:      after {}m idle, AI {}",
        config.behaviour.idle_minutes,
        on_off(config.behaviour.starter_use_ai)
    );

    match config.validate() {
        Ok(()) => println!("\n  ✅ Config valid"),
        Err(e) => println!("\n  ❌ {e}"),
    }

    let config_path = BotConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `banter onboard` first");
    }

    Ok(())
}
