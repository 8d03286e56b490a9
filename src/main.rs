use std::path::Path;
use std::sync::Arc;

use bevy::prelude::*;
use clap::Parser;

use speechoke::app::SpeechokePlugin;
use speechoke::config::Config;
use speechoke::critique::OfflineCritic;
use speechoke::script::Script;

/// Karaoke for speeches: read a script off the prompter over a reactive
/// backing track and get your delivery judged.
#[derive(Parser, Debug)]
#[command(name = "speechoke", version, about)]
struct Args {
    /// Path to a config file (defaults to ./speechoke.toml)
    #[arg(long)]
    config: Option<String>,

    /// Plain-text script to perform instead of the built-in one
    #[arg(long)]
    script: Option<String>,

    /// Title shown for a custom script
    #[arg(long)]
    title: Option<String>,

    /// Initial scroll speed multiplier
    #[arg(long)]
    speed: Option<f32>,

    /// Initial backing track volume (0.0 to 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Keep the backing track silent
    #[arg(long)]
    mute: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    // Load configuration from file
    let mut config = Config::load(args.config.as_deref());
    if let Some(volume) = args.volume {
        config.volume = volume.clamp(0.0, 1.0);
    }
    if let Some(speed) = args.speed {
        config.teleprompter.default_speed = config.teleprompter.clamp_speed(speed);
    }

    let script = match &args.script {
        Some(path) => match Script::from_file(Path::new(path), args.title.as_deref()) {
            Ok(script) => script,
            Err(err) => {
                log::error!("[speechoke] cannot read script {path}: {err}");
                println!("⚠️  Could not read {path}, using the default script");
                Script::default()
            }
        },
        None => Script::default(),
    };

    println!("🎤 Speechoke");
    println!("📜 {} by {}", script.title, script.author);
    println!("   {}", script.excerpt());
    println!("🎚️  Volume {:.0}% | speed {:.2}x", config.volume * 100.0, config.teleprompter.default_speed);
    println!("⌨️  Controls:");
    println!("   SPACE    start / finish the performance");
    println!("   UP/DOWN  backing track volume");
    println!("   +/-      scroll speed");
    println!("   P        pause / resume scrolling");
    println!("   R        rewind the script");
    println!("   A        toggle ambience");
    println!("   M        madness cue");

    App::default()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Speechoke".into(),
                resolution: (1200.0, 800.0).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(SpeechokePlugin {
            config,
            script,
            critic: Arc::new(OfflineCritic),
            mute: args.mute,
        })
        .run();
}
