//! Tone conversion example.
//!
//! Generates a 440Hz tone at CD quality and converts it to the 16kHz mono
//! format most speech-to-text services expect.
//!
//! Run with: cargo run --example tone

use pcm_stream::{convert_samples, AudioSpec, AudioStream, FormatPreset, MockSource, SampleFormat};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG=pcm_stream=debug to see pipeline events
    tracing_subscriber::fmt::init();

    let src = FormatPreset::Cd.spec();
    let dst = FormatPreset::Transcription.spec();
    let stream = AudioStream::new(Some(src), Some(dst))?;

    let mut mock = MockSource::new(src);
    mock.generate_sine(440.0, 500);
    mock.generate_silence(100);
    println!("Generated {:?} of {}", mock.duration(), src);

    // Feed in 10ms pieces, the way a capture callback would
    let pushed = mock.push_into(&stream, 441)?;
    stream.flush()?;
    println!("Pushed {pushed} bytes, {} available", stream.available());

    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }

    let peak = out
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]).unsigned_abs())
        .max()
        .unwrap_or(0);
    println!(
        "Pulled {} bytes of {} ({} frames), peak {peak}",
        out.len(),
        dst,
        out.len() / dst.frame_size()
    );

    // The same conversion in one call
    let mut again = MockSource::new(src);
    again.generate_sine(440.0, 500);
    let f32_out = convert_samples(
        &src,
        again.bytes(),
        &AudioSpec::new(SampleFormat::F32, 2, 48000),
    )?;
    println!("One-shot conversion to 48kHz F32: {} bytes", f32_out.len());

    println!("Stats: {:?}", stream.stats());
    stream.close();
    Ok(())
}
