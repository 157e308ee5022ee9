use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use crate::config::RenderSettings;
use crate::error::{Error, Result};
use crate::layout::AssetLayout;
use crate::log::ProjectLog;
use crate::model::ContentPlan;
use crate::render::{Compositor, RenderJob};
use crate::timeline::{IntervalKind, Timeline};

const CHALLENGE_BRIGHTNESS: f64 = 0.06;
const INTRO_WRAP: usize = 22;
const WORD_WRAP: usize = 16;

async fn run_cmd(args: &[String]) -> Result<()> {
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };

    let output = Command::new(program)
        .args(rest)
        .output()
        .await
        .map_err(|e| Error::RenderFailure(format!("could not start {program}: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::RenderFailure(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

/// Renders with the `ffmpeg` binary: a looped still background, drawtext captions and mixed audio.
pub struct FfmpegCompositor {
    settings: RenderSettings,
    log: Arc<ProjectLog>,
}

impl FfmpegCompositor {
    pub fn new(settings: RenderSettings, log: Arc<ProjectLog>) -> Self {
        Self { settings, log }
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    async fn render(&self, job: &RenderJob<'_>) -> Result<()> {
        let background = job.layout.background();
        if !background.exists() {
            return Err(Error::RenderFailure(format!(
                "background image missing: {}",
                background.display()
            )));
        }

        let scratch = TempDir::new_in(job.layout.dir())?;
        let mut captions = Vec::new();
        for (i, caption) in collect_captions(job.plan, job.timeline).into_iter().enumerate() {
            let file = scratch.path().join(format!("caption_{i}.txt"));
            fs::write(&file, &caption.text)?;
            captions.push((caption, file));
        }
        let audio = audio_inputs(job.layout, job.timeline);
        let graph = filter_graph(&self.settings, job.timeline, &captions, &audio);

        let staged = job.output.with_extension("rendering.mp4");
        let args = render_args(&self.settings, job.timeline, &background, &audio, &graph, &staged);

        self.log.info(format!(
            "Composing {:.2}s video with {} captions and {} audio tracks...",
            job.timeline.total,
            captions.len(),
            audio.len()
        ));
        if let Err(err) = run_cmd(&args).await {
            let _ = fs::remove_file(&staged);
            return Err(err);
        }
        fs::rename(&staged, job.output)?;
        self.log
            .ok(format!("Final video written to {}", job.output.display()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptionStyle {
    Intro,
    Challenge,
    Countdown,
    Reveal,
}

impl CaptionStyle {
    fn font_size(self) -> u32 {
        match self {
            CaptionStyle::Intro => 64,
            CaptionStyle::Challenge | CaptionStyle::Reveal => 110,
            CaptionStyle::Countdown => 180,
        }
    }

    fn y(self) -> &'static str {
        match self {
            CaptionStyle::Intro => "(h-text_h)/2",
            CaptionStyle::Challenge | CaptionStyle::Reveal => "h*0.32-text_h/2",
            CaptionStyle::Countdown => "h*0.62-text_h/2",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Caption {
    text: String,
    start: f64,
    end: f64,
    style: CaptionStyle,
}

fn collect_captions(plan: &ContentPlan, timeline: &Timeline) -> Vec<Caption> {
    let mut out = Vec::new();
    for interval in &timeline.intervals {
        let (text, style) = match interval.kind {
            IntervalKind::IntroCaption => {
                (wrap_text(&plan.intro_text, INTRO_WRAP), CaptionStyle::Intro)
            }
            IntervalKind::ChallengeCaption { scene } => match plan.word_pairs.get(scene) {
                Some(pair) => (wrap_text(&pair.source_word, WORD_WRAP), CaptionStyle::Challenge),
                None => continue,
            },
            IntervalKind::CountdownTick { value, .. } => {
                (value.to_string(), CaptionStyle::Countdown)
            }
            IntervalKind::RevealCaption { scene } => match plan.word_pairs.get(scene) {
                Some(pair) => (wrap_text(&pair.target_word, WORD_WRAP), CaptionStyle::Reveal),
                None => continue,
            },
            _ => continue,
        };
        out.push(Caption {
            text,
            start: interval.start,
            end: interval.end(),
            style,
        });
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
struct AudioInput {
    path: PathBuf,
    delay_ms: u64,
    music: bool,
}

fn audio_inputs(layout: &AssetLayout, timeline: &Timeline) -> Vec<AudioInput> {
    timeline
        .intervals
        .iter()
        .filter_map(|interval| {
            let (path, music) = match interval.kind {
                IntervalKind::IntroAudio => (layout.intro_audio(), false),
                IntervalKind::RevealAudio { scene } => (layout.word_audio(scene), false),
                IntervalKind::MusicBed => (layout.music(), true),
                _ => return None,
            };
            Some(AudioInput {
                path,
                delay_ms: (interval.start * 1000.0).round() as u64,
                music,
            })
        })
        .collect()
}

fn filter_graph(
    settings: &RenderSettings,
    timeline: &Timeline,
    captions: &[(Caption, PathBuf)],
    audio: &[AudioInput],
) -> String {
    let (w, h) = (settings.width, settings.height);
    let mut video = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,\
         drawbox=x=0:y=0:w=iw:h=ih:color=black@{:.2}:t=fill",
        settings.darken_opacity
    );
    for visual in timeline.of_kind(|k| matches!(k, IntervalKind::ChallengeVisual { .. })) {
        let _ = write!(
            video,
            ",eq=brightness={CHALLENGE_BRIGHTNESS}:enable='{}'",
            between(visual.start, visual.end())
        );
    }
    for (caption, file) in captions {
        let _ = write!(
            video,
            ",drawtext=textfile='{}':expansion=none:fontcolor=white:fontsize={}:\
             borderw=4:bordercolor=black@0.6:line_spacing=12:x=(w-text_w)/2:y={}:enable='{}'",
            escape_path(file),
            caption.style.font_size(),
            caption.style.y(),
            between(caption.start, caption.end)
        );
        if let Some(font) = &settings.font_file {
            let _ = write!(video, ":fontfile='{}'", escape_path(font));
        }
    }
    video.push_str("[v]");

    let mut graph = video;
    let mut labels = String::new();
    for (i, input) in audio.iter().enumerate() {
        let label = format!("a{i}");
        let stream = i + 1;
        if input.music {
            let _ = write!(
                graph,
                ";[{stream}:a]volume={:.2},atrim=0:{:.3}[{label}]",
                settings.music_volume, timeline.total
            );
        } else {
            let _ = write!(graph, ";[{stream}:a]adelay={}:all=1[{label}]", input.delay_ms);
        }
        let _ = write!(labels, "[{label}]");
    }
    if audio.is_empty() {
        let _ = write!(graph, ";anullsrc=r=48000:cl=stereo,atrim=0:{:.3}[a]", timeline.total);
    } else {
        let _ = write!(
            graph,
            ";{labels}amix=inputs={}:normalize=0,apad,atrim=0:{:.3}[a]",
            audio.len(),
            timeline.total
        );
    }
    graph
}

fn render_args(
    settings: &RenderSettings,
    timeline: &Timeline,
    background: &Path,
    audio: &[AudioInput],
    graph: &str,
    out_mp4: &Path,
) -> Vec<String> {
    let total = format!("{:.3}", timeline.total);
    let mut args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-loop".to_string(),
        "1".to_string(),
        "-framerate".to_string(),
        settings.fps.to_string(),
        "-t".to_string(),
        total.clone(),
        "-i".to_string(),
        background.display().to_string(),
    ];
    for input in audio {
        args.push("-i".to_string());
        args.push(input.path.display().to_string());
    }
    args.extend([
        "-filter_complex".to_string(),
        graph.to_string(),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "[a]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        settings.fps.to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-t".to_string(),
        total,
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mp4".to_string(),
        out_mp4.display().to_string(),
    ]);
    args
}

fn between(start: f64, end: f64) -> String {
    format!("between(t,{start:.3},{end:.3})")
}

fn escape_path(path: &Path) -> String {
    path.display()
        .to_string()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Breaks text into lines of at most `width` characters. Words longer than a line are split.
fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            lines.push(word.drain(..width).collect());
        }
        if word.is_empty() {
            continue;
        }
        let needed = if line.is_empty() {
            word.len()
        } else {
            line.chars().count() + 1 + word.len()
        };
        if needed > width && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.extend(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::sample_plan;
    use crate::timeline::{AudioDurations, TimelineSettings, build_timeline};

    fn timeline(words: usize, music: bool) -> Timeline {
        let durations = AudioDurations {
            intro: 3.0,
            words: vec![1.2; words],
        };
        build_timeline(&TimelineSettings::default(), &durations, music)
    }

    #[test]
    fn every_caption_interval_gets_text() {
        let plan = sample_plan(2);
        let captions = collect_captions(&plan, &timeline(2, false));
        assert_eq!(captions.len(), 1 + 2 * (1 + 5 + 1));
        assert_eq!(captions[0].style, CaptionStyle::Intro);
        assert_eq!(captions[0].start, 0.5);

        let reveal = captions
            .iter()
            .find(|c| c.style == CaptionStyle::Reveal)
            .unwrap();
        assert_eq!(reveal.text, "kotoba 0");
        let ticks: Vec<_> = captions
            .iter()
            .filter(|c| c.style == CaptionStyle::Countdown)
            .take(5)
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(ticks, vec!["5", "4", "3", "2", "1"]);
    }

    #[test]
    fn audio_is_delayed_to_its_interval() {
        let layout = AssetLayout::new("out/p");
        let inputs = audio_inputs(&layout, &timeline(1, true));
        assert_eq!(inputs.len(), 3);
        assert!(inputs[0].music);
        assert_eq!(inputs[1].path, layout.intro_audio());
        assert_eq!(inputs[1].delay_ms, 500);
        // 0.5 + 3 + 1 + 5 + 0.2
        assert_eq!(inputs[2].delay_ms, 9700);
    }

    #[test]
    fn graph_mixes_every_track_and_trims_to_total() {
        let settings = RenderSettings::default();
        let timeline = timeline(1, true);
        let layout = AssetLayout::new("out/p");
        let audio = audio_inputs(&layout, &timeline);
        let graph = filter_graph(&settings, &timeline, &[], &audio);

        assert!(graph.starts_with("[0:v]scale=1080:1920"));
        assert!(graph.contains("eq=brightness=0.06:enable='between(t,4.500,9.500)'"));
        assert!(graph.contains("[1:a]volume=0.15,atrim=0:12.500[a0]"));
        assert!(graph.contains("[a0][a1][a2]amix=inputs=3:normalize=0,apad,atrim=0:12.500[a]"));
    }

    #[test]
    fn silent_track_is_generated_without_audio_inputs() {
        let graph = filter_graph(&RenderSettings::default(), &timeline(1, false), &[], &[]);
        assert!(graph.ends_with("anullsrc=r=48000:cl=stereo,atrim=0:12.500[a]"));
    }

    #[test]
    fn captions_reference_their_text_files_and_font() {
        let settings = RenderSettings {
            font_file: Some(PathBuf::from("/fonts/Poppins-Bold.ttf")),
            ..RenderSettings::default()
        };
        let caption = Caption {
            text: "hi".into(),
            start: 0.5,
            end: 3.5,
            style: CaptionStyle::Intro,
        };
        let graph = filter_graph(
            &settings,
            &timeline(1, false),
            &[(caption, PathBuf::from("/tmp/c:0.txt"))],
            &[],
        );
        assert!(graph.contains("textfile='/tmp/c\\:0.txt'"));
        assert!(
            graph.contains("enable='between(t,0.500,3.500)':fontfile='/fonts/Poppins-Bold.ttf'")
        );
    }

    #[test]
    fn args_stage_output_and_list_inputs_in_order() {
        let layout = AssetLayout::new("out/p");
        let timeline = timeline(1, false);
        let audio = audio_inputs(&layout, &timeline);
        let args = render_args(
            &RenderSettings::default(),
            &timeline,
            &layout.background(),
            &audio,
            "graph",
            Path::new("out/p/final_video.rendering.mp4"),
        );
        let inputs: Vec<_> = args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect();
        assert_eq!(
            inputs,
            vec!["out/p/background.png", "out/p/intro_audio.wav", "out/p/word_0.wav"]
        );
        assert_eq!(args.last().unwrap(), "out/p/final_video.rendering.mp4");
    }

    #[test]
    fn long_text_is_wrapped() {
        assert_eq!(
            wrap_text("You get five seconds to guess each translation!", 22),
            "You get five seconds\nto guess each\ntranslation!"
        );
        assert_eq!(wrap_text("ありがとうございます", 4), "ありがと\nうござい\nます");
        assert_eq!(wrap_text("short", 16), "short");
    }
}
