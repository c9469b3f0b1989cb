use vesper::{list_midi_input_ports, AdsrParams, EngineConfig, EnvelopeRate, VesperServer};

use anyhow::{Context, Result};
use crossbeam_channel as channel;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
struct EngineOpt {
    /// Samples per second (ignored for live output, which uses the device rate)
    #[structopt(long = "sample-rate", default_value = "44100")]
    sample_rate: f32,

    /// Frames per rendered block
    #[structopt(short = "b", long = "block-size", default_value = "2048")]
    block_size: usize,

    #[structopt(long = "attack", default_value = "0.01")]
    attack: f32,

    #[structopt(long = "decay", default_value = "0.1")]
    decay: f32,

    #[structopt(long = "sustain", default_value = "0.7")]
    sustain: f32,

    #[structopt(long = "release", default_value = "0.2")]
    release: f32,

    /// How often envelopes advance: "sample" or "block"
    #[structopt(long = "envelope-rate", default_value = "sample")]
    envelope_rate: EnvelopeRate,

    /// Play notes at full level instead of through the ADSR envelope
    #[structopt(long = "no-envelope")]
    no_envelope: bool,
}

impl EngineOpt {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            adsr: AdsrParams::new(self.attack, self.decay, self.sustain, self.release),
            envelope_rate: self.envelope_rate,
            envelope_bypass: self.no_envelope,
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "cli")]
enum Opt {
    List,
    Run {
        #[structopt(short = "p", long = "port")]
        midi_input_port: usize,

        #[structopt(flatten)]
        engine: EngineOpt,
    },
    PlayFile {
        #[structopt(short = "m", long = "midi", parse(from_os_str))]
        midi_path: PathBuf,

        #[structopt(long = "bpm", default_value = "120")]
        bpm: f64,

        #[structopt(flatten)]
        engine: EngineOpt,
    },
    Render {
        #[structopt(short = "m", long = "midi", parse(from_os_str))]
        midi_path: PathBuf,

        #[structopt(short = "o", long = "output", parse(from_os_str))]
        wav_path: PathBuf,

        #[structopt(long = "bpm", default_value = "120")]
        bpm: f64,

        #[structopt(flatten)]
        engine: EngineOpt,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::from_args();

    // Set SIGINT handler.
    let (exit_tx, exit_rx) = channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = exit_tx.try_send(());
    })
    .context("Error setting Ctrl-C handler")?;

    match opt {
        Opt::List => {
            println!("--- Available MIDI input ports ---");
            for (i, name) in list_midi_input_ports()?.iter().enumerate() {
                println!("{}: {}", i, name);
            }
        }
        Opt::Run {
            midi_input_port,
            engine,
        } => {
            let server = VesperServer::new(exit_rx, engine.config());
            server.run_midi_device(midi_input_port)?;
        }
        Opt::PlayFile {
            midi_path,
            bpm,
            engine,
        } => {
            let server = VesperServer::new(exit_rx, engine.config());
            server.run_midi_file(&midi_path, bpm)?;
        }
        Opt::Render {
            midi_path,
            wav_path,
            bpm,
            engine,
        } => {
            let server = VesperServer::new(exit_rx, engine.config());
            server.render_midi_file(&midi_path, &wav_path, bpm)?;
        }
    }

    Ok(())
}
