use std::fmt;
use std::str::FromStr;

/// A named step in a project's lifecycle, stored verbatim in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Initialized,
    Planning,
    GeneratingCoreAssets,
    CalculatingDuration,
    GeneratingMusic,
    ComposingVideo,
    Completed,
    Failed,
    RegeneratingBackground,
    RegeneratingIntro,
    RegeneratingWords,
    RegeneratingMusic,
    RegeneratingVideo,
}

impl Phase {
    const ALL: [Phase; 13] = [
        Phase::Initialized,
        Phase::Planning,
        Phase::GeneratingCoreAssets,
        Phase::CalculatingDuration,
        Phase::GeneratingMusic,
        Phase::ComposingVideo,
        Phase::Completed,
        Phase::Failed,
        Phase::RegeneratingBackground,
        Phase::RegeneratingIntro,
        Phase::RegeneratingWords,
        Phase::RegeneratingMusic,
        Phase::RegeneratingVideo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initialized => "Initialized",
            Phase::Planning => "Planning",
            Phase::GeneratingCoreAssets => "Generating Core Assets",
            Phase::CalculatingDuration => "Calculating Duration",
            Phase::GeneratingMusic => "Generating Music",
            Phase::ComposingVideo => "Composing Video",
            Phase::Completed => "Completed",
            Phase::Failed => "Failed",
            Phase::RegeneratingBackground => "Regenerating Background",
            Phase::RegeneratingIntro => "Regenerating Intro",
            Phase::RegeneratingWords => "Regenerating Words",
            Phase::RegeneratingMusic => "Regenerating Music",
            Phase::RegeneratingVideo => "Regenerating Video",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn is_regeneration(self) -> bool {
        matches!(
            self,
            Phase::RegeneratingBackground
                | Phase::RegeneratingIntro
                | Phase::RegeneratingWords
                | Phase::RegeneratingMusic
                | Phase::RegeneratingVideo
        )
    }

    /// Whether a project sitting in `self` may be moved to `next`.
    ///
    /// Re-applying the current phase is always allowed so a crashed run can
    /// re-enter it. The asset pipeline and the regeneration phases can be
    /// entered from anywhere once planning is behind the project.
    pub fn permits(self, next: Phase) -> bool {
        use Phase::*;

        if self == next {
            return true;
        }
        let planned = !matches!(self, Initialized | Planning);
        match (self, next) {
            (Completed, Failed) => false,
            (_, Failed) => true,
            (Initialized, Planning) => true,
            (Planning, GeneratingCoreAssets) => true,
            (GeneratingCoreAssets, CalculatingDuration)
            | (CalculatingDuration, GeneratingMusic)
            | (GeneratingMusic, ComposingVideo)
            | (ComposingVideo, Completed) => true,
            (_, GeneratingCoreAssets) => planned,
            (_, to) if to.is_regeneration() => planned,
            (from, Completed) => from.is_regeneration(),
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown project phase: {s}"))
    }
}
