use std::path::{Path, PathBuf};

/// File names inside a project's asset directory.
#[derive(Debug, Clone)]
pub struct AssetLayout {
    dir: PathBuf,
}

impl AssetLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn intro_audio(&self) -> PathBuf {
        self.dir.join("intro_audio.wav")
    }

    pub fn word_audio(&self, index: usize) -> PathBuf {
        self.dir.join(format!("word_{index}.wav"))
    }

    pub fn background(&self) -> PathBuf {
        self.dir.join("background.png")
    }

    pub fn music(&self) -> PathBuf {
        self.dir.join("music.wav")
    }

    pub fn music_partial(&self) -> PathBuf {
        self.dir.join("music.wav.partial")
    }

    pub fn final_video(&self) -> PathBuf {
        self.dir.join("final_video.mp4")
    }

    /// Every audio file the timeline depends on, intro first.
    pub fn speech_files(&self, word_count: usize) -> Vec<PathBuf> {
        std::iter::once(self.intro_audio())
            .chain((0..word_count).map(|i| self.word_audio(i)))
            .collect()
    }
}
