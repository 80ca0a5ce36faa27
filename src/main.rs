//! Application entry point: pov-kids, a point-and-speak language tutor.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run).
//! 3. Load or create the learner [`Profile`].
//! 4. Create the [`tokio`] runtime.
//! 5. Build the remote services and local devices.
//! 6. Spawn the profile persister and the status printer.
//! 7. Start the keyboard listener.
//! 8. Run the [`SessionOrchestrator`] until the quit key is pressed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use pov_kids::{
    audio::{CpalMicrophone, CpalOutput},
    camera::FileCamera,
    config::{AppConfig, AppPaths},
    hotkey::{HotkeyListener, KeyBindings},
    language::LanguageDescriptor,
    reward::{JsonProfileStore, Profile, ProfileStore},
    services::{FallbackEvaluator, GeminiClient},
    session::{new_shared_state, Devices, Services, SessionCommand, SessionOrchestrator, SharedState},
};

// ---------------------------------------------------------------------------
// Profile bootstrap
// ---------------------------------------------------------------------------

/// The first stored profile, or a fresh one saved on the spot.
fn load_profile(store: &dyn ProfileStore, config: &AppConfig) -> Profile {
    match store.load_all() {
        Ok(profiles) if !profiles.is_empty() => {
            let profile = profiles[0].clone();
            log::info!("Loaded profile {} ({} coins)", profile.name, profile.coins);
            profile
        }
        Ok(_) => {
            let profile = Profile::new("Explorer", "🦊", config.reward.default_daily_goal);
            if let Err(e) = store.save(&profile) {
                log::warn!("Failed to save new profile: {e:#}");
            }
            profile
        }
        Err(e) => {
            log::warn!("Failed to load profiles ({e:#}); starting a temporary profile");
            Profile::new("Explorer", "🦊", config.reward.default_daily_goal)
        }
    }
}

/// The profile's first known target language, else the configured default.
fn starting_language(profile: &Profile, config: &AppConfig) -> LanguageDescriptor {
    profile
        .target_languages
        .iter()
        .find_map(|code| config.language(code).cloned())
        .unwrap_or_else(|| config.initial_language())
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Persist every profile the session proposes.
async fn persist_profiles(store: Arc<dyn ProfileStore>, mut rx: mpsc::UnboundedReceiver<Profile>) {
    while let Some(profile) = rx.recv().await {
        let store = Arc::clone(&store);
        let saved = tokio::task::spawn_blocking(move || store.save(&profile)).await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Failed to save profile: {e:#}"),
            Err(e) => log::warn!("Profile save task failed: {e}"),
        }
    }
}

/// Print a line whenever something the learner should see changes.
async fn print_status(state: SharedState) {
    let mut last = String::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        ticker.tick().await;
        let line = state.lock().unwrap().status_line();
        if line != last {
            println!("{line}");
            last = line;
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("pov-kids starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e:#}); using defaults");
        AppConfig::default()
    });

    // 3. Profile
    let store: Arc<dyn ProfileStore> = Arc::new(JsonProfileStore::new(AppPaths::new().profiles_file));
    let profile = load_profile(store.as_ref(), &config);
    let state = new_shared_state(profile.clone(), starting_language(&profile, &config));

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async move {
        // 5. Services and devices
        let client = Arc::new(GeminiClient::from_config(&config.service).with_languages(config.languages.clone()));
        let services = Services {
            recognizer: client.clone(),
            synthesizer: client,
            evaluator: Arc::new(FallbackEvaluator::new(GeminiClient::from_config(&config.service))),
        };

        let camera_dir = config.camera.resolved_source_dir();
        log::info!("Camera stills are read from {}", camera_dir.display());
        let devices = Devices {
            camera: Arc::new(FileCamera::new(camera_dir)),
            microphone: Arc::new(CpalMicrophone),
            output: Arc::new(CpalOutput),
        };

        // 6. Background tasks
        let (profile_tx, profile_rx) = mpsc::unbounded_channel();
        let persister = tokio::spawn(persist_profiles(Arc::clone(&store), profile_rx));
        tokio::spawn(print_status(Arc::clone(&state)));

        // 7. Keyboard
        let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(16);
        let _listener = HotkeyListener::start(KeyBindings::from_config(&config.keys), command_tx);
        log::info!(
            "Keys: {} start, {} capture, hold {} to speak, {} replay, {} language, {} next, {} retry, {} home, {} quit",
            config.keys.start,
            config.keys.capture,
            config.keys.hold,
            config.keys.replay,
            config.keys.next_language,
            config.keys.next_word,
            config.keys.retry,
            config.keys.go_home,
            config.keys.quit
        );

        // 8. Session
        let orchestrator = SessionOrchestrator::new(&config, Arc::clone(&state), services, devices)
            .with_profile_sink(profile_tx);
        orchestrator.run(command_rx).await;

        // The sink closed with the orchestrator; let queued saves finish.
        if let Err(e) = persister.await {
            log::warn!("Profile persister failed: {e}");
        }
    });

    log::info!("pov-kids shut down");
    Ok(())
}
