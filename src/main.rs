//! Network simulation for the inbound audio path.
//!
//! ```text
//! sender ──(crossbeam, jitter/loss/reorder/dup)──► network ──► StreamRegistry
//!                                                                  │
//!                               playback ◄──(rtrb)── mixer ◄───────┘
//! ```
//!
//! Usage: `inbound-audio [config.json]`. Set `RUST_LOG=debug` to see
//! starvation and depth changes per stream.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender};
use inbound_audio::stream::format::encode_pcm_body;
use inbound_audio::stream::{
    AudioPacket, PacketType, PcmFormat, StreamConfig, StreamFormat, StreamRegistry, SystemClock,
};
use rand::Rng;
use rtrb::{Consumer, Producer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SENDERS: usize = 3;
const RUN_TIME: Duration = Duration::from_secs(10);
const MAX_JITTER: Duration = Duration::from_millis(40);
const LOSS_PROBABILITY: f64 = 0.02;
const DUPLICATE_PROBABILITY: f64 = 0.01;
/// Extra delay applied to a few packets so they overtake each other.
const REORDER_PROBABILITY: f64 = 0.03;
const STALE_TIMEOUT: Duration = Duration::from_secs(5);
const REPORT_INTERVAL: Duration = Duration::from_secs(2);
const PLAYBACK_QUEUE_FRAMES: usize = 64;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run() {
        error!("Simulation failed: {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => StreamConfig::load(&path)?,
        None => StreamConfig::default(),
    };
    info!(
        "Simulating {} senders for {:?}: {} samples per frame, {} us per frame",
        SENDERS, RUN_TIME, config.frame_samples, config.frame_duration_usecs
    );

    let max_packet_samples = config.frame_samples;
    let registry = Arc::new(StreamRegistry::<i16>::new(
        config.clone(),
        Arc::new(SystemClock::new()),
        Box::new(move || -> Box<dyn StreamFormat<i16>> {
            Box::new(PcmFormat::new(max_packet_samples))
        }),
    )?);
    let running = Arc::new(AtomicBool::new(true));

    let (datagram_sender, datagram_receiver) = crossbeam::channel::unbounded();
    let (playback_producer, playback_consumer) =
        rtrb::RingBuffer::<Vec<i16>>::new(PLAYBACK_QUEUE_FRAMES);
    // Played frames travel back to the mixer for reuse.
    let (recycle_producer, recycle_consumer) =
        rtrb::RingBuffer::<Vec<i16>>::new(PLAYBACK_QUEUE_FRAMES);

    let sender = spawn("audio-sender", {
        let config = config.clone();
        move || run_senders(config, datagram_sender)
    })?;
    let network = spawn("audio-network", {
        let registry = registry.clone();
        let running = running.clone();
        move || run_network(registry, datagram_receiver, running)
    })?;
    let mixer = spawn("audio-mixer", {
        let registry = registry.clone();
        move || run_mixer(registry, running, playback_producer, recycle_consumer)
    })?;
    let playback = spawn("audio-playback", move || {
        run_playback(playback_consumer, recycle_producer)
    })?;

    for handle in [sender, network, mixer, playback] {
        if handle.join().is_err() {
            anyhow::bail!("Simulation thread panicked");
        }
    }
    Ok(())
}

fn spawn(name: &str, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .with_context(|| format!("Failed to spawn {} thread", name))
}

struct SimulatedSender {
    id: Uuid,
    sequence: u16,
    phase: f32,
    frequency: f32,
}

impl SimulatedSender {
    fn new(index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            phase: 0.0,
            frequency: 220.0 * (index + 1) as f32,
        }
    }

    /// Builds the next datagram: a quiet sine tone at 24 kHz.
    fn next_datagram(&mut self, frame_samples: usize) -> Vec<u8> {
        let step = TAU * self.frequency / 24_000.0;
        let samples: Vec<i16> = (0..frame_samples)
            .map(|_| {
                self.phase = (self.phase + step) % TAU;
                (self.phase.sin() * 4000.0) as i16
            })
            .collect();

        let mut body = Vec::with_capacity(4 + frame_samples * 2);
        encode_pcm_body(self.sequence, &samples, &mut body);
        self.sequence = self.sequence.wrapping_add(1);

        let mut datagram = Vec::new();
        AudioPacket::new(PacketType::MicrophoneAudio, self.id, &body).write_datagram(&mut datagram);
        datagram
    }
}

fn run_senders(config: StreamConfig, datagrams: Sender<Vec<u8>>) {
    info!("Sender thread started");
    let mut rng = rand::thread_rng();
    let frame_period = Duration::from_micros(config.frame_duration_usecs);
    let mut senders: Vec<SimulatedSender> = (0..SENDERS).map(SimulatedSender::new).collect();
    let mut in_flight: Vec<(Instant, Vec<u8>)> = Vec::new();

    let start = Instant::now();
    let mut next_frame = start;
    while start.elapsed() < RUN_TIME {
        let now = Instant::now();

        if now >= next_frame {
            for sender in &mut senders {
                let datagram = sender.next_datagram(config.frame_samples);
                if rng.gen_bool(LOSS_PROBABILITY) {
                    continue;
                }

                let mut delay = Duration::from_micros(
                    rng.gen_range(0..=MAX_JITTER.as_micros() as u64),
                );
                if rng.gen_bool(REORDER_PROBABILITY) {
                    delay += frame_period * 2;
                }
                if rng.gen_bool(DUPLICATE_PROBABILITY) {
                    in_flight.push((now + delay + frame_period, datagram.clone()));
                }
                in_flight.push((now + delay, datagram));
            }
            next_frame += frame_period;
        }

        let mut index = 0;
        while index < in_flight.len() {
            if in_flight[index].0 <= now {
                let (_, datagram) = in_flight.swap_remove(index);
                if datagrams.send(datagram).is_err() {
                    warn!("Mixer gone, sender stopping");
                    return;
                }
            } else {
                index += 1;
            }
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    info!("Sender thread stopped");
}

/// Ingests datagrams until the sender goes away.
fn run_network(
    registry: Arc<StreamRegistry<i16>>,
    datagrams: Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
) {
    info!("Network thread started");

    for datagram in datagrams.iter() {
        match AudioPacket::from_datagram(&datagram) {
            Ok(packet) => {
                registry.receive(&packet);
            }
            Err(e) => warn!("Dropping malformed datagram: {:?}", e),
        }
    }

    running.store(false, Ordering::Release);
    info!("Sender disconnected, network thread stopped");
}

/// Pops one mixed frame per frame period.
fn run_mixer(
    registry: Arc<StreamRegistry<i16>>,
    running: Arc<AtomicBool>,
    mut playback: Producer<Vec<i16>>,
    mut recycled: Consumer<Vec<i16>>,
) {
    info!("Mixer thread started");
    let frame_period = Duration::from_micros(registry.config().frame_duration_usecs);
    let frame_samples = registry.config().frame_samples;
    let mut next_frame = Instant::now() + frame_period;
    let mut next_report = Instant::now() + REPORT_INTERVAL;

    while running.load(Ordering::Acquire) {
        std::thread::sleep(next_frame.saturating_duration_since(Instant::now()));

        let mut mixed = recycled
            .pop()
            .unwrap_or_else(|_| Vec::with_capacity(frame_samples));
        mixed.resize(frame_samples, 0);
        registry.pop_and_mix(1, true, &mut mixed);
        if playback.push(mixed).is_err() {
            warn!("Playback queue full, dropping mixed frame");
        }
        next_frame += frame_period;

        let now = Instant::now();
        if now >= next_report {
            registry.cleanup_stale(STALE_TIMEOUT);
            for (sender, stats) in registry.collect_stats() {
                match stats.to_json() {
                    Ok(json) => info!("Stream {}: {}", sender, json),
                    Err(e) => warn!("Failed to encode stats for {}: {:?}", sender, e),
                }
            }
            next_report += REPORT_INTERVAL;
        }
    }

    info!("Mixer thread stopped");
}

fn run_playback(mut playback: Consumer<Vec<i16>>, mut recycle: Producer<Vec<i16>>) {
    info!("Playback thread started");
    let mut audible_frames = 0u64;
    let mut silent_frames = 0u64;

    loop {
        match playback.pop() {
            Ok(frame) => {
                if frame.iter().all(|&sample| sample == 0) {
                    silent_frames += 1;
                } else {
                    audible_frames += 1;
                }
                let _ = recycle.push(frame);
            }
            Err(_) if playback.is_abandoned() => break,
            Err(_) => std::thread::sleep(Duration::from_millis(2)),
        }
    }

    let total = audible_frames + silent_frames;
    info!(
        "Playback finished: {} frames, {} audible, {} silent ({:.1}%)",
        total,
        audible_frames,
        silent_frames,
        if total == 0 {
            0.0
        } else {
            silent_frames as f64 * 100.0 / total as f64
        }
    );
}
