//! The end-to-end driver: plan, core assets, duration, music, render.
//!
//! Every phase is recorded through the state machine before its work starts,
//! and every asset step skips artifacts that already exist. Re-running a
//! project after a crash therefore continues where it stopped without calling
//! the services again for finished files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;

use crate::api::GenerativeBackend;
use crate::assets::AssetGenerator;
use crate::config::Config;
use crate::credentials::CredentialPool;
use crate::error::{Error, Result};
use crate::layout::AssetLayout;
use crate::log::ProjectLog;
use crate::model::ContentPlan;
use crate::phase::Phase;
use crate::planner::{ContentPlanner, project_name};
use crate::render::{Compositor, RenderJob};
use crate::retry::RetryingCaller;
use crate::state::ProjectStateMachine;
use crate::store::{ProjectId, ProjectRecord, Store};
use crate::timeline::{AudioDurations, build_timeline, calculate_duration};

/// Which project a `resume` or `regenerate` acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSelector {
    /// Most recent failed project for `resume`, most recent planned project for `regenerate`.
    Latest,
    Named(String),
}

impl From<Option<String>> for ProjectSelector {
    fn from(name: Option<String>) -> Self {
        name.map_or(ProjectSelector::Latest, ProjectSelector::Named)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerationOp {
    All,
    Video,
    Background,
    Intro,
    Music,
    Words,
    Word(usize),
}

impl RegenerationOp {
    fn phase(self) -> Phase {
        match self {
            RegenerationOp::All => Phase::GeneratingCoreAssets,
            RegenerationOp::Video => Phase::RegeneratingVideo,
            RegenerationOp::Background => Phase::RegeneratingBackground,
            RegenerationOp::Intro => Phase::RegeneratingIntro,
            RegenerationOp::Music => Phase::RegeneratingMusic,
            RegenerationOp::Words | RegenerationOp::Word(_) => Phase::RegeneratingWords,
        }
    }

    /// Files removed before the operation regenerates them.
    fn artifacts(self, layout: &AssetLayout, word_count: usize) -> Vec<PathBuf> {
        match self {
            RegenerationOp::All => {
                let mut all = layout.speech_files(word_count);
                all.extend([
                    layout.background(),
                    layout.music(),
                    layout.music_partial(),
                    layout.final_video(),
                ]);
                all
            }
            RegenerationOp::Video => vec![layout.final_video()],
            RegenerationOp::Background => vec![layout.background()],
            RegenerationOp::Intro => vec![layout.intro_audio()],
            RegenerationOp::Music => vec![layout.music(), layout.music_partial()],
            RegenerationOp::Words => (0..word_count).map(|i| layout.word_audio(i)).collect(),
            RegenerationOp::Word(index) => vec![layout.word_audio(index)],
        }
    }
}

impl fmt::Display for RegenerationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegenerationOp::All => f.write_str("all"),
            RegenerationOp::Video => f.write_str("video"),
            RegenerationOp::Background => f.write_str("background"),
            RegenerationOp::Intro => f.write_str("intro"),
            RegenerationOp::Music => f.write_str("music"),
            RegenerationOp::Words => f.write_str("words"),
            RegenerationOp::Word(i) => write!(f, "word:{i}"),
        }
    }
}

impl FromStr for RegenerationOp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let op = match lowered.as_str() {
            "all" => RegenerationOp::All,
            "video" => RegenerationOp::Video,
            "background" => RegenerationOp::Background,
            "intro" => RegenerationOp::Intro,
            "music" => RegenerationOp::Music,
            "words" => RegenerationOp::Words,
            other => {
                let index = other
                    .strip_prefix("word:")
                    .or_else(|| other.strip_prefix("word-"))
                    .or_else(|| other.strip_prefix("word_"))
                    .ok_or_else(|| {
                        format!(
                            "unknown regeneration target '{s}' (expected all, video, background, intro, music, words or word:N)"
                        )
                    })?;
                let index = index
                    .parse()
                    .map_err(|_| format!("invalid word index in '{s}'"))?;
                RegenerationOp::Word(index)
            }
        };
        Ok(op)
    }
}

/// A project whose final video exists.
#[derive(Debug, Clone)]
pub struct CompletedProject {
    pub id: ProjectId,
    pub name: String,
    pub asset_dir: PathBuf,
    pub video: PathBuf,
    pub plan: ContentPlan,
    pub duration_s: f64,
    pub has_music: bool,
}

pub struct Pipeline {
    config: Config,
    store: Arc<Store>,
    machine: ProjectStateMachine,
    planner: ContentPlanner,
    assets: AssetGenerator,
    compositor: Arc<dyn Compositor>,
    log: Arc<ProjectLog>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        store: Arc<Store>,
        pool: Arc<CredentialPool>,
        backend: Arc<dyn GenerativeBackend>,
        compositor: Arc<dyn Compositor>,
        log: Arc<ProjectLog>,
    ) -> Self {
        let caller = RetryingCaller::new(pool, log.clone());
        let planner = ContentPlanner::new(
            caller.clone(),
            backend.clone(),
            log.clone(),
            config.delays.planner(),
        );
        let assets = AssetGenerator::new(
            caller,
            backend,
            log.clone(),
            config.voices.clone(),
            config.delays.clone(),
            config.music.clone(),
        );
        Self {
            machine: ProjectStateMachine::new(store.clone(), log.clone()),
            config,
            store,
            planner,
            assets,
            compositor,
            log,
        }
    }

    /// Plans a new project from `prompt` and runs it to completion.
    pub async fn create(&self, prompt: &str) -> Result<CompletedProject> {
        let id = self.store.create_preliminary_project(prompt)?;
        self.log.bind(id);
        self.log
            .info(format!("Project initialized with temporary ID: {id}"));
        let outcome = self.plan_and_run(id, prompt).await;
        self.settle(id, outcome)
    }

    async fn plan_and_run(&self, id: ProjectId, prompt: &str) -> Result<CompletedProject> {
        self.machine.transition(id, Phase::Planning)?;
        let plan = self.planner.generate_plan(prompt).await?;

        let name = project_name(&plan.project_slug, Utc::now())?;
        let asset_dir = self.config.output_dir.join(&name);
        fs::create_dir_all(&asset_dir)?;
        self.store.finalize_project(id, &name, &asset_dir, &plan)?;
        self.log.info(format!("Project finalized as '{name}'."));

        let record = self.store.load_project(id)?;
        self.run_project(&record).await
    }

    /// Re-runs a planned project from the top. Finished artifacts are kept.
    pub async fn resume(&self, selector: ProjectSelector) -> Result<CompletedProject> {
        let record = match selector {
            ProjectSelector::Latest => {
                self.log
                    .info("No project name specified, finding last failed project...");
                self.store.last_failed_project()?
            }
            ProjectSelector::Named(name) => self.store.find_by_name(&name)?,
        };
        self.log.bind(record.id);
        self.log.info(format!(
            "Resuming project '{}' (status: {}).",
            record.name, record.phase
        ));
        let outcome = self.run_project(&record).await;
        self.settle(record.id, outcome)
    }

    /// Deletes and rebuilds part of a project. Returns the project when a video was produced.
    pub async fn regenerate(
        &self,
        op: RegenerationOp,
        selector: ProjectSelector,
    ) -> Result<Option<CompletedProject>> {
        let record = match selector {
            ProjectSelector::Latest => {
                self.log.info("No project name specified, finding last project...");
                self.store.last_project()?
            }
            ProjectSelector::Named(name) => self.store.find_by_name(&name)?,
        };
        self.log.bind(record.id);
        let outcome = self.apply(op, &record).await;
        match outcome {
            Ok(done) => {
                self.log
                    .ok(format!("Regeneration task '{op}' for '{}' completed.", record.name));
                Ok(done)
            }
            Err(err) => self.settle(record.id, Err(err)),
        }
    }

    async fn apply(
        &self,
        op: RegenerationOp,
        record: &ProjectRecord,
    ) -> Result<Option<CompletedProject>> {
        let plan = record.require_plan()?;
        let count = plan.word_pairs.len();
        if let RegenerationOp::Word(index) = op {
            if index >= count {
                return Err(Error::NoWordAtIndex { index, count });
            }
        }

        let layout = AssetLayout::new(&record.asset_dir);
        fs::create_dir_all(layout.dir())?;
        self.log
            .info(format!("Regenerating {op} for project: {}", record.name));
        for path in op.artifacts(&layout, count) {
            self.delete_asset(&path)?;
        }

        if op == RegenerationOp::All {
            return self.run_project(record).await.map(Some);
        }

        self.machine.transition(record.id, op.phase())?;
        let produced = match op {
            RegenerationOp::Background => {
                self.assets
                    .background_image(&plan.image_generation_prompt, &layout.background())
                    .await?;
                None
            }
            RegenerationOp::Intro => {
                self.assets.intro(plan, &layout).await?;
                None
            }
            RegenerationOp::Words => {
                self.assets.words(plan, &layout).await?;
                None
            }
            RegenerationOp::Word(index) => {
                self.assets.word(plan, &layout, index).await?;
                None
            }
            RegenerationOp::Music => {
                let durations = AudioDurations::measure(&layout, count)?;
                let duration = calculate_duration(&self.config.timeline, &durations);
                self.assets.music(plan, duration, &layout).await;
                None
            }
            RegenerationOp::Video => {
                let durations = AudioDurations::measure(&layout, count)?;
                Some(self.compose(record, plan, &layout, &durations).await?)
            }
            RegenerationOp::All => None,
        };
        if layout.final_video().exists() {
            self.machine.transition(record.id, Phase::Completed)?;
        } else {
            self.log.warn(format!(
                "Project '{}' has no final video yet. Run `resume {}` to finish it.",
                record.name, record.name
            ));
            self.machine.transition(record.id, Phase::Failed)?;
        }
        Ok(produced)
    }

    async fn run_project(&self, record: &ProjectRecord) -> Result<CompletedProject> {
        let plan = record.require_plan()?;
        let layout = AssetLayout::new(&record.asset_dir);
        let id = record.id;

        if record.phase == Phase::Completed && layout.final_video().exists() {
            self.log.ok(format!(
                "Project '{}' already has a final video. Skipping full run.",
                record.name
            ));
            let durations = AudioDurations::measure(&layout, plan.word_pairs.len())?;
            return Ok(self.summary(record, plan, &layout, &durations));
        }

        self.machine.transition(id, Phase::GeneratingCoreAssets)?;
        self.assets.core_assets(plan, &layout).await?;

        self.machine.transition(id, Phase::CalculatingDuration)?;
        self.log.info("Calculating final video duration...");
        let durations = AudioDurations::measure(&layout, plan.word_pairs.len())?;
        let duration = calculate_duration(&self.config.timeline, &durations);
        self.log
            .ok(format!("Final video duration calculated: {duration:.2}s"));

        self.machine.transition(id, Phase::GeneratingMusic)?;
        self.assets.music(plan, duration, &layout).await;

        self.machine.transition(id, Phase::ComposingVideo)?;
        let done = self.compose(record, plan, &layout, &durations).await?;

        self.machine.transition(id, Phase::Completed)?;
        self.log
            .ok(format!("Project '{}' completed successfully!", record.name));
        Ok(done)
    }

    async fn compose(
        &self,
        record: &ProjectRecord,
        plan: &ContentPlan,
        layout: &AssetLayout,
        durations: &AudioDurations,
    ) -> Result<CompletedProject> {
        let output = layout.final_video();
        if output.exists() {
            self.log.info("Skipping existing final video.");
            return Ok(self.summary(record, plan, layout, durations));
        }

        let has_music = layout.music().exists();
        if !has_music {
            self.log.warn("No music track found. Composing without a music bed.");
        }
        let timeline = build_timeline(&self.config.timeline, durations, has_music);
        self.compositor
            .render(&RenderJob {
                plan,
                layout,
                timeline: &timeline,
                output: &output,
            })
            .await?;
        Ok(self.summary(record, plan, layout, durations))
    }

    fn summary(
        &self,
        record: &ProjectRecord,
        plan: &ContentPlan,
        layout: &AssetLayout,
        durations: &AudioDurations,
    ) -> CompletedProject {
        CompletedProject {
            id: record.id,
            name: record.name.clone(),
            asset_dir: layout.dir().to_path_buf(),
            video: layout.final_video(),
            plan: plan.clone(),
            duration_s: calculate_duration(&self.config.timeline, durations),
            has_music: layout.music().exists(),
        }
    }

    fn delete_asset(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(path)?;
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        self.log.info(format!("Deleted existing asset: {name}"));
        Ok(())
    }

    /// Marks the project failed on error and attaches its name for the resume hint.
    fn settle<T>(&self, id: ProjectId, outcome: Result<T>) -> Result<T> {
        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        self.log.error(format!("Project failed: {err}"));
        if let Err(mark) = self.machine.fail(id) {
            self.log
                .error(format!("Could not mark project {id} as failed: {mark}"));
        }
        let (name, next_step) = match self.store.load_project(id) {
            Ok(record) if record.plan.is_some() => {
                let hint = format!("Rerun with `resume {}` once the cause is fixed.", record.name);
                (record.name, hint)
            }
            Ok(record) => (
                record.name,
                "No content plan was saved. Start over with `new <prompt>`.".to_string(),
            ),
            Err(_) => (
                format!("id {id}"),
                "Start over with `new <prompt>`.".to_string(),
            ),
        };
        Err(Error::ProjectFailed {
            name,
            id,
            next_step,
            source: Box::new(err),
        })
    }
}
