//! Scene timing.
//!
//! The video is a fixed sequence: an intro, then one challenge/reveal scene per
//! word pair. Every length is derived from measured speech durations, so the
//! duration computed here is what the music is sized to and what the
//! compositor renders.
//!
//! ```text
//! |lead-in| intro audio |pause| challenge (D s) | reveal |pause| challenge | reveal |pause|
//! ```

use serde::{Deserialize, Serialize};

use crate::audio::wav_duration;
use crate::error::Result;
use crate::layout::AssetLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Silence before the intro starts.
    pub lead_in_s: f64,
    pub scene_pause_s: f64,
    /// Guessing window, also the number of countdown ticks.
    pub challenge_s: u32,
    pub min_reveal_s: f64,
    /// Extra time the reveal holds after the word audio ends.
    pub reveal_margin_s: f64,
    pub reveal_audio_delay_s: f64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            lead_in_s: 0.5,
            scene_pause_s: 1.0,
            challenge_s: 5,
            min_reveal_s: 2.0,
            reveal_margin_s: 0.5,
            reveal_audio_delay_s: 0.2,
        }
    }
}

impl TimelineSettings {
    pub fn reveal_length(&self, word_audio_s: f64) -> f64 {
        (word_audio_s + self.reveal_margin_s).max(self.min_reveal_s)
    }
}

/// Measured lengths of the speech clips, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDurations {
    pub intro: f64,
    pub words: Vec<f64>,
}

impl AudioDurations {
    /// Reads every speech clip. A missing or unreadable clip is an error, never a default.
    pub fn measure(layout: &AssetLayout, word_count: usize) -> Result<Self> {
        let intro = wav_duration(&layout.intro_audio())?;
        let words = (0..word_count)
            .map(|i| wav_duration(&layout.word_audio(i)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { intro, words })
    }
}

pub fn calculate_duration(settings: &TimelineSettings, durations: &AudioDurations) -> f64 {
    let mut t = settings.lead_in_s + durations.intro + settings.scene_pause_s;
    for &word in &durations.words {
        t += f64::from(settings.challenge_s);
        t += settings.reveal_length(word) + settings.scene_pause_s;
    }
    t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    IntroAudio,
    IntroCaption,
    ChallengeCaption { scene: usize },
    ChallengeVisual { scene: usize },
    CountdownTick { scene: usize, value: u32 },
    RevealCaption { scene: usize },
    RevealAudio { scene: usize },
    MusicBed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub kind: IntervalKind,
    pub start: f64,
    pub duration: f64,
}

impl Interval {
    fn new(kind: IntervalKind, start: f64, duration: f64) -> Self {
        Self {
            kind,
            start,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub intervals: Vec<Interval>,
    pub total: f64,
}

impl Timeline {
    pub fn of_kind<'a>(
        &'a self,
        wanted: impl Fn(&IntervalKind) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Interval> + 'a {
        self.intervals.iter().filter(move |i| wanted(&i.kind))
    }
}

/// Lays out every interval of the video. `total` always equals [`calculate_duration`].
pub fn build_timeline(
    settings: &TimelineSettings,
    durations: &AudioDurations,
    include_music: bool,
) -> Timeline {
    let total = calculate_duration(settings, durations);
    let mut intervals = Vec::new();

    if include_music {
        intervals.push(Interval::new(IntervalKind::MusicBed, 0.0, total));
    }

    let mut t = settings.lead_in_s;
    intervals.push(Interval::new(IntervalKind::IntroAudio, t, durations.intro));
    intervals.push(Interval::new(IntervalKind::IntroCaption, t, durations.intro));
    t += durations.intro + settings.scene_pause_s;

    let challenge = f64::from(settings.challenge_s);
    for (scene, &word) in durations.words.iter().enumerate() {
        intervals.push(Interval::new(IntervalKind::ChallengeCaption { scene }, t, challenge));
        intervals.push(Interval::new(IntervalKind::ChallengeVisual { scene }, t, challenge));
        for (offset, value) in (1..=settings.challenge_s).rev().enumerate() {
            intervals.push(Interval::new(
                IntervalKind::CountdownTick { scene, value },
                t + offset as f64,
                1.0,
            ));
        }
        t += challenge;

        let reveal = settings.reveal_length(word);
        intervals.push(Interval::new(IntervalKind::RevealCaption { scene }, t, reveal));
        intervals.push(Interval::new(
            IntervalKind::RevealAudio { scene },
            t + settings.reveal_audio_delay_s,
            word,
        ));
        t += reveal + settings.scene_pause_s;
    }

    Timeline { intervals, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::api::PcmAudio;
    use crate::audio::write_pcm_wav;
    use crate::error::Error;

    const EPS: f64 = 1e-9;

    fn durations(intro: f64, words: &[f64]) -> AudioDurations {
        AudioDurations {
            intro,
            words: words.to_vec(),
        }
    }

    #[test]
    fn single_short_word_matches_worked_example() {
        let total = calculate_duration(&TimelineSettings::default(), &durations(3.0, &[1.2]));
        assert!((total - 12.5).abs() < EPS, "{total}");
    }

    #[test]
    fn reveal_never_drops_below_the_floor() {
        let settings = TimelineSettings::default();
        assert_eq!(settings.reveal_length(0.1), 2.0);
        assert_eq!(settings.reveal_length(1.5), 2.0);
        assert!((settings.reveal_length(2.5) - 3.0).abs() < EPS);
    }

    #[test]
    fn long_word_extends_its_reveal() {
        let settings = TimelineSettings::default();
        let total = calculate_duration(&settings, &durations(2.0, &[3.0, 1.0]));
        // 0.5 + 2 + 1, then (5 + 3.5 + 1) and (5 + 2 + 1)
        assert!((total - 21.0).abs() < EPS, "{total}");
    }

    #[test]
    fn schedule_total_matches_calculated_duration() {
        let settings = TimelineSettings::default();
        let d = durations(2.7, &[0.8, 2.4, 1.9]);
        let timeline = build_timeline(&settings, &d, true);
        assert!((timeline.total - calculate_duration(&settings, &d)).abs() < EPS);

        let bed: Vec<_> = timeline.of_kind(|k| *k == IntervalKind::MusicBed).collect();
        assert_eq!(bed.len(), 1);
        assert_eq!(bed[0].start, 0.0);
        assert!((bed[0].end() - timeline.total).abs() < EPS);

        let last_reveal = timeline
            .of_kind(|k| matches!(k, IntervalKind::RevealCaption { .. }))
            .last()
            .unwrap();
        assert!((last_reveal.end() + settings.scene_pause_s - timeline.total).abs() < EPS);
    }

    #[test]
    fn scenes_are_separated_by_the_pause() {
        let settings = TimelineSettings::default();
        let timeline = build_timeline(&settings, &durations(3.0, &[1.0, 1.0]), false);

        let intro = timeline.of_kind(|k| *k == IntervalKind::IntroCaption).next().unwrap();
        assert_eq!(intro.start, 0.5);

        let challenges: Vec<_> = timeline
            .of_kind(|k| matches!(k, IntervalKind::ChallengeCaption { .. }))
            .collect();
        let reveals: Vec<_> = timeline
            .of_kind(|k| matches!(k, IntervalKind::RevealCaption { .. }))
            .collect();
        assert!((challenges[0].start - (intro.end() + 1.0)).abs() < EPS);
        assert!((reveals[0].start - challenges[0].end()).abs() < EPS);
        assert!((challenges[1].start - (reveals[0].end() + 1.0)).abs() < EPS);
    }

    #[test]
    fn countdown_ticks_count_down_once_per_second() {
        let settings = TimelineSettings::default();
        let timeline = build_timeline(&settings, &durations(1.0, &[1.0]), false);
        let challenge = timeline
            .of_kind(|k| matches!(k, IntervalKind::ChallengeVisual { scene: 0 }))
            .next()
            .unwrap();
        let ticks: Vec<_> = timeline
            .of_kind(|k| matches!(k, IntervalKind::CountdownTick { .. }))
            .map(|i| match i.kind {
                IntervalKind::CountdownTick { value, .. } => (value, i.start - challenge.start),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            ticks,
            vec![(5, 0.0), (4, 1.0), (3, 2.0), (2, 3.0), (1, 4.0)]
        );
    }

    #[test]
    fn word_audio_starts_after_its_caption() {
        let settings = TimelineSettings::default();
        let timeline = build_timeline(&settings, &durations(1.0, &[1.3]), false);
        let caption = timeline
            .of_kind(|k| matches!(k, IntervalKind::RevealCaption { .. }))
            .next()
            .unwrap();
        let audio = timeline
            .of_kind(|k| matches!(k, IntervalKind::RevealAudio { .. }))
            .next()
            .unwrap();
        assert!((audio.start - caption.start - 0.2).abs() < EPS);
        assert!((audio.duration - 1.3).abs() < EPS);
        assert!(timeline.of_kind(|k| *k == IntervalKind::MusicBed).next().is_none());
    }

    #[test]
    fn measuring_reports_missing_word_audio() {
        let dir = TempDir::new().unwrap();
        let layout = AssetLayout::new(dir.path());
        let clip = PcmAudio {
            samples: vec![0; 24_000],
            sample_rate: 24_000,
            channels: 1,
        };
        write_pcm_wav(&layout.intro_audio(), &clip).unwrap();
        write_pcm_wav(&layout.word_audio(0), &clip).unwrap();

        let measured = AudioDurations::measure(&layout, 1).unwrap();
        assert_eq!(measured, durations(1.0, &[1.0]));

        let err = AudioDurations::measure(&layout, 2).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingAsset { ref path, .. } if path == &layout.word_audio(1)
        ));
    }
}
