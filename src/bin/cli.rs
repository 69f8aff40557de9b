//! soundflow CLI: headless playback and WAV export.
//!
//! Usage:
//!   sf-cli path/to/file.mid
//!   sf-cli path/to/file.wav --wav output.wav
//!   sf-cli path/to/file.mid --wav output.wav --rate 48000 --seconds 30
//!   sf-cli path/to/file.mid --device "USB Audio"
//!   sf-cli path/to/file.wav --master "Low Pass" --master Gain
//!   sf-cli --list-devices

use sf_master::{list_output_devices, CompositionConfig, Controller};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use std::env;

const DEFAULT_MAX_SECONDS: u64 = 300;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--list-devices") {
        for device in list_output_devices() {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{}", device.name, marker);
        }
        return;
    }
    let path = args.get(1).unwrap_or_else(|| {
        eprintln!(
            "Usage: sf-cli <file.mid|file.wav> [--wav output.wav] [--rate HZ] [--seconds N] [--device NAME] [--master MODIFIER]..."
        );
        eprintln!("       sf-cli --list-devices");
        std::process::exit(1);
    });

    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let wav_path = flag("--wav");
    let sample_rate = flag("--rate").and_then(|r| r.parse().ok()).unwrap_or(44100);
    let max_seconds = flag("--seconds").and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_MAX_SECONDS);

    let config = CompositionConfig { sample_rate, ..CompositionConfig::default() };
    let mut ctrl = Controller::new(config).unwrap_or_else(|e| {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    });
    ctrl.set_output_device(flag("--device"));

    let masters = args.windows(2).filter(|w| w[0] == "--master").map(|w| w[1].as_str());
    for name in masters {
        if let Err(e) = ctrl.add_master_modifier(name) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = load(&mut ctrl, Path::new(path)) {
        eprintln!("Failed to load {}: {}", path, e);
        std::process::exit(1);
    }

    {
        let composition = ctrl.lock();
        println!("Audio tracks: {}", composition.tracks().len());
        println!("MIDI tracks:  {}", composition.midi_tracks().len());
        for track in composition.midi_tracks() {
            let notes: usize = track.segments().iter().map(|s| s.sequence().note_count()).sum();
            println!("  {:<20} {} notes", track.name, notes);
        }
        println!("Tempo:        {} BPM", composition.tempo().bpm_at(Duration::ZERO));
        println!("Duration:     {:.2} s", composition.duration().as_secs_f64());
        println!();
    }

    let max = Duration::from_secs(max_seconds);
    match wav_path {
        Some(wav) => render_to_wav(&ctrl, &wav, max),
        None => play_audio(&mut ctrl),
    }
}

fn load(ctrl: &mut Controller, path: &Path) -> Result<(), sf_master::ControllerError> {
    let is_wav = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        let name = path.file_stem().map_or_else(|| "Audio".to_string(), |s| s.to_string_lossy().into_owned());
        let track = ctrl.lock().editor().add_track(&name);
        ctrl.add_wav_segment(track, path, Duration::ZERO)?;
    } else {
        ctrl.import_midi(path)?;
    }
    Ok(())
}

fn play_audio(ctrl: &mut Controller) {
    ctrl.play();
    println!("Playing...");
    println!();

    while ctrl.is_playing() {
        if let Some(pos) = ctrl.position() {
            print!("\rPosition: {:>8.2} s", pos.as_secs_f64());
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    println!("\rDone.                 ");
}

fn render_to_wav(ctrl: &Controller, path: &str, max: Duration) {
    println!("Rendering to {} at {} Hz...", path, ctrl.lock().sample_rate());

    let frames = ctrl.render_to_wav(Path::new(path), max).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });
    println!("Rendered {} frames", frames);
    println!("Done.");
}
