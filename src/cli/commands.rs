// CLI command implementations
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::Context;
use byteorder::{ByteOrder, LittleEndian};
use serde_json::json;
use speexogg::{parse_wav, CommentHeader, OggPage, SpeexHeader, SpeexMode};
use tracing::debug;

use crate::cli::output::OutputFormatter;
use crate::cli::CliResult;

/// Expand glob patterns; plain paths pass through unchanged
pub fn expand_patterns(patterns: &[String]) -> CliResult<Vec<String>> {
    let mut files = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            files.push(pattern.clone());
            continue;
        }
        let mut matched = 0;
        for entry in glob::glob(pattern).with_context(|| format!("bad pattern {}", pattern))? {
            files.push(entry?.display().to_string());
            matched += 1;
        }
        debug!(pattern = %pattern, matched, "expanded glob");
    }
    Ok(files)
}

/// Report the format of each WAV file; returns the number of failures
pub fn command_info(files: &[String], formatter: &OutputFormatter) -> CliResult<usize> {
    let files = expand_patterns(files)?;
    if files.is_empty() {
        anyhow::bail!("No files matched");
    }

    let stdout = io::stdout();
    let total = files.len();
    let mut failures = 0;
    for file_path in files {
        match wav_report(Path::new(&file_path)) {
            Ok(report) => formatter.output(&report, &mut stdout.lock())?,
            Err(e) => {
                formatter.print_error(&format!("{}: {:#}", file_path, e));
                failures += 1;
            }
        }
    }
    formatter.print_success(&format!(
        "{} of {} file(s) inspected",
        total - failures,
        total
    ));
    Ok(failures)
}

fn wav_report(path: &Path) -> CliResult<serde_json::Value> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let audio = parse_wav(&data).map_err(|e| anyhow::anyhow!("{} ({})", e, e.code()))?;
    let rate = audio.format.sample_rate.hz();

    Ok(json!({
        "file": path.display().to_string(),
        "format": audio.format,
        "samples": audio.samples.len(),
        "duration_seconds": audio.samples.len() as f64 / rate as f64,
    }))
}

/// List the pages of an Ogg Speex stream
pub fn command_pages(file: &Path, formatter: &OutputFormatter) -> CliResult<()> {
    let reader = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let pages = OggPage::read_all(&mut BufReader::new(reader));
    if pages.is_empty() {
        anyhow::bail!("{}: no Ogg pages found", file.display());
    }

    let report = pages_report(&pages);
    formatter.output(&report, &mut io::stdout().lock())?;
    formatter.print_success(&format!("{}: {} page(s)", file.display(), pages.len()));
    Ok(())
}

/// Decode raw signed 16-bit little-endian PCM
pub fn raw_samples(bytes: &[u8]) -> CliResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        anyhow::bail!(
            "raw PCM holds {} bytes; 16-bit samples need an even count",
            bytes.len()
        );
    }
    let mut samples = vec![0i16; bytes.len() / 2];
    LittleEndian::read_i16_into(bytes, &mut samples);
    Ok(samples)
}

pub fn pages_report(pages: &[OggPage]) -> serde_json::Value {
    let identification = pages
        .first()
        .and_then(|page| page.packets().first().and_then(|p| SpeexHeader::parse(p)));
    let comment = pages.get(1).and_then(|page| {
        page.packets()
            .first()
            .and_then(|p| CommentHeader::read(&mut io::Cursor::new(*p)).ok())
    });
    let mode = identification
        .as_ref()
        .and_then(|h| SpeexMode::from_id(h.mode))
        .map(|m| m.to_string());

    let listing: Vec<serde_json::Value> = pages
        .iter()
        .map(|page| {
            json!({
                "sequence": page.header.page_sequence,
                "granule_position": page.header.granule_position,
                "bos": page.header.is_bos(),
                "eos": page.header.is_eos(),
                "packets": page.packets().len(),
                "bytes": page.data.len(),
                "crc_ok": page.verify_crc(),
            })
        })
        .collect();

    json!({
        "speex_header": identification,
        "mode": mode,
        "comment_header": comment,
        "page_count": pages.len(),
        "pages": listing,
    })
}

#[cfg(feature = "native-speex")]
pub use encode::command_encode;

#[cfg(feature = "native-speex")]
mod encode {
    use std::path::Path;

    use anyhow::Context;
    use speexogg::{EncodingSessionConfig, NativeSpeex, SampleRate, SpeexEncoder};

    use crate::cli::config::EncodeArgs;
    use crate::cli::output::OutputFormatter;
    use crate::cli::CliResult;

    /// Build the session config: preset file first, then flags
    pub fn session_config(args: &EncodeArgs) -> CliResult<EncodingSessionConfig> {
        let mut config = match &args.preset {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading preset {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing preset {}", path.display()))?
            }
            None => EncodingSessionConfig::default(),
        };

        if let Some(mode) = args.mode {
            config.mode = mode.into();
        }
        if let Some(quality) = args.quality {
            config.quality = quality;
        }
        if let Some(rate) = args.rate {
            config.output_sample_rate = SampleRate::from_hz(rate)?;
        }
        config.comments.extend(args.comments.iter().cloned());
        Ok(config)
    }

    pub fn command_encode(args: &EncodeArgs, formatter: &OutputFormatter) -> CliResult<()> {
        let config = session_config(args)?;
        let mut encoder = SpeexEncoder::new(NativeSpeex, config)
            .map_err(|e| anyhow::anyhow!("{} ({})", e, e.code()))?;

        let mut ogg = match args.raw_rate {
            Some(rate) => {
                let rate = SampleRate::from_hz(rate)?;
                let input = std::fs::read(&args.input)
                    .with_context(|| format!("reading {}", args.input.display()))?;
                let samples = super::raw_samples(&input)
                    .with_context(|| format!("decoding {}", args.input.display()))?;
                encoder.encode_audio(&samples, rate)
            }
            None => encoder.encode_wav_file(&args.input),
        }
        .map_err(|e| anyhow::anyhow!("{}: {} ({})", args.input.display(), e, e.code()))?;
        ogg.extend(
            encoder
                .finish()
                .map_err(|e| anyhow::anyhow!("{} ({})", e, e.code()))?,
        );

        write_output(&args.output, &ogg)?;
        formatter.print_success(&format!(
            "{} -> {} ({} frames, {} bytes)",
            args.input.display(),
            args.output.display(),
            encoder.frames_encoded(),
            ogg.len()
        ));
        Ok(())
    }

    fn write_output(path: &Path, data: &[u8]) -> CliResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speexogg::{OggPacketizer, SampleRate};

    #[test]
    fn test_plain_paths_pass_through() {
        let files = expand_patterns(&["a.wav".to_string(), "dir/b.wav".to_string()]).unwrap();
        assert_eq!(files, vec!["a.wav", "dir/b.wav"]);
    }

    #[test]
    fn test_raw_samples_little_endian() {
        assert_eq!(raw_samples(&[0x01, 0x00, 0xFF, 0xFF]).unwrap(), vec![1, -1]);
        assert!(raw_samples(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_raw_samples_rejects_odd_length() {
        let err = raw_samples(&[0x01, 0x00, 0x02]).unwrap_err();
        assert!(err.to_string().contains("3 bytes"));
    }

    #[test]
    fn test_pages_report() {
        let header = SpeexHeader::new(SampleRate::Hz8000, SpeexMode::Narrowband, 160, 8000).unwrap();
        let mut packetizer =
            OggPacketizer::new(9, 79, &header, &CommentHeader::new(vec!["A=b".into()])).unwrap();
        let mut bytes = Vec::new();
        packetizer
            .write_frames(&[vec![1, 2, 3], vec![4, 5]], 160, &mut bytes)
            .unwrap();
        packetizer.write_end(&mut bytes).unwrap();

        let pages = OggPage::read_all(&mut io::Cursor::new(&bytes));
        let report = pages_report(&pages);

        assert_eq!(report["page_count"], 4);
        assert_eq!(report["mode"], "narrowband");
        assert_eq!(report["speex_header"]["rate"], 8000);
        assert_eq!(report["comment_header"]["comments"][0], "A=b");
        assert_eq!(report["pages"][2]["packets"], 2);
        assert_eq!(report["pages"][3]["eos"], true);
        assert_eq!(report["pages"][3]["granule_position"], 320);
    }
}
