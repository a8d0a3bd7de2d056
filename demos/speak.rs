use std::path::PathBuf;
use std::time::Instant;

use offline_tts::{Rate, Readiness, SynthesisOptions, TtsConfig, VoiceController};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let voice = args
        .next()
        .unwrap_or_else(|| offline_tts::config::DEFAULT_VOICE.to_string());
    let rate: Rate = match args.next() {
        Some(rate) => rate.parse()?,
        None => Rate::Medium,
    };

    let mut tts = VoiceController::new(TtsConfig::default())?;
    println!("Storage root: {}", tts.config().storage_root.display());

    let load_start = Instant::now();
    tts.set_voice(&voice)?;
    println!("Voice '{voice}' prepared in {:.2?}", load_start.elapsed());

    if let Readiness::Degraded(reason) = tts.readiness() {
        println!("Running degraded ({reason}); output is placeholder audio");
        let check = tts.environment_check();
        println!("Platform: {}", check.platform_key);
        for issue in &check.issues {
            println!("  - {issue}");
        }
    }

    let text = "Hello! This voice runs entirely on this machine, \
                with no network needed once the model is downloaded.";
    let options = SynthesisOptions {
        rate,
        ..Default::default()
    };

    let synth_start = Instant::now();
    let (chunks, boundaries) = tts.synthesize_stream(text, &options)?;
    let wav: Vec<u8> = chunks.flatten().collect();
    println!(
        "Synthesized {} bytes in {:.2?}",
        wav.len(),
        synth_start.elapsed()
    );
    for word in &boundaries {
        println!(
            "{:>8.1} ms  {:>7.1} ms  {}",
            word.offset_ms, word.duration_ms, word.text
        );
    }

    let output = PathBuf::from("output.wav");
    std::fs::write(&output, wav)?;
    println!("Saved to {}", output.display());
    Ok(())
}
