//! Simulated playback device example.
//!
//! Binds a stream to a fake 48kHz stereo playback device and drives it from a
//! task that pulls 10ms periods, the way an audio server thread would. The
//! stream's get callback refills it from a mono tone generator on demand.
//!
//! Run with: cargo run --example device_pull

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pcm_stream::{callback_with_context, AudioDevice, AudioSpec, AudioStream, MockSource, SampleFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let device = AudioDevice::playback("demo speakers", AudioSpec::new(SampleFormat::F32, 2, 48000))?;
    let src = AudioSpec::new(SampleFormat::S16, 1, 22050);

    let stream = Arc::new(AudioStream::new(Some(src), None)?);
    stream.bind(&device)?;
    stream.set_output_channel_map(Some(&[0, 1]))?;
    println!("Bound to {} ({}), source {}", device.name(), device.spec(), src);

    // Refill from the generator whenever a pull comes up short
    let generator = Mutex::new(MockSource::new(src));
    stream.set_get_callback(Some(callback_with_context(
        generator,
        |generator, stream, additional, _total| {
            if additional == 0 {
                return;
            }
            let mut source = generator.lock();
            source.generate_sine(330.0, 20);
            if let Err(e) = source.push_into(stream, 512) {
                tracing::warn!(error = %e, "refill failed");
            }
        },
    )));

    let period = device.spec().frame_size() * 480;
    let device_stream = Arc::clone(&stream);
    let playback = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(10));
        let mut played = 0usize;
        for tick in 0..100 {
            interval.tick().await;
            if device_stream.device_paused().unwrap_or(true) {
                continue;
            }
            match device_stream.pull(period) {
                Ok(pulled) => played += pulled.len(),
                Err(e) => {
                    tracing::warn!(tick, error = %e, "pull failed");
                    break;
                }
            }
        }
        played
    });

    // Pause for a moment mid-stream, then slow playback down
    tokio::time::sleep(Duration::from_millis(300)).await;
    stream.pause_device()?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    stream.set_frequency_ratio(0.5)?;
    stream.resume_device()?;

    let played = playback.await?;
    println!(
        "Played {played} bytes ({:.2}s at device rate)",
        played as f64 / (device.spec().frame_size() as f64 * 48000.0)
    );
    println!("Stats: {:?}", stream.stats());

    stream.unbind();
    Ok(())
}
