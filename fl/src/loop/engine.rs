//! LoopEngine - drives feature iterations through the phase machine
//!
//! Each iteration: select the feature, build a fresh context, render the phase
//! prompt, call the agent, parse its response, then either run the requested
//! actions or advance the phase machine. State crosses iterations only
//! through the persisted ResumeState and an explicit one-shot handoff.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::machine::{PhaseEvent, PhaseMachine, Transition};
use super::outcome::{LoopError, LoopOutcome};
use crate::agent::{AgentClient, UserChannel};
use crate::config::Config;
use crate::domain::{Feature, FeatureList, Phase};
use crate::progress::{CarryOver, ContextBuilder, ContextError, ContextRequest, append_progress, progress_entry};
use crate::prompts::PromptLoader;
use crate::protocol::{Action, AgentResponse, parse_response};
use crate::state::{ResumeState, ResumeStore};
use crate::tools::{ParallelExecutor, ToolContext, ToolProfile};

/// Results of one iteration that the next iteration sees, then forgets
#[derive(Debug, Default)]
struct Handoff {
    action_report: Option<String>,
    user_question: Option<String>,
    user_answer: Option<String>,
}

/// What one iteration decided
#[derive(Debug)]
enum Step {
    Continue(String),
    Finish(LoopOutcome, String),
    Cancelled,
}

/// Loop execution engine
pub struct LoopEngine {
    config: Config,
    agent: Arc<dyn AgentClient>,
    user: Arc<dyn UserChannel>,
    executor: ParallelExecutor,
    builder: ContextBuilder,
    prompts: PromptLoader,
    store: ResumeStore,
    /// Included in the first iteration of this run only
    tagged: Vec<PathBuf>,
    /// Ignore any persisted resume state
    fresh: bool,
}

impl LoopEngine {
    pub fn new(config: Config, agent: Arc<dyn AgentClient>, user: Arc<dyn UserChannel>) -> Result<Self, LoopError> {
        debug!(work_dir = %config.paths.work_dir.display(), "LoopEngine::new: called");
        let state_dir = config.state_dir();
        Ok(Self {
            executor: ParallelExecutor::new(config.executor),
            builder: ContextBuilder::from_config(&config),
            prompts: PromptLoader::new(&state_dir)?,
            store: ResumeStore::new(&state_dir),
            config,
            agent,
            user,
            tagged: Vec::new(),
            fresh: false,
        })
    }

    pub fn with_tagged(mut self, tagged: Vec<PathBuf>) -> Self {
        self.tagged = tagged;
        self
    }

    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn store(&self) -> &ResumeStore {
        &self.store
    }

    /// Run iterations until an outcome is reached or a fatal error occurs
    pub async fn run(&self, cancel: CancellationToken) -> Result<LoopOutcome, LoopError> {
        let spec_path = self.config.spec_path();
        let max_iterations = self.config.looping.max_iterations;
        info!(
            work_dir = %self.config.paths.work_dir.display(),
            spec = %spec_path.display(),
            max_iterations,
            phased = self.config.looping.phased,
            "Starting feature loop"
        );

        let mut state = self.initial_state(&spec_path);
        let mut machine = state.phase.map(|phase| {
            PhaseMachine::restore(phase, state.validation_attempts, self.config.looping.max_validation_attempts)
        });
        let mut handoff = Handoff::default();
        let mut first = true;

        loop {
            if cancel.is_cancelled() {
                return self.stop_cancelled(&mut state, machine.as_ref());
            }

            let features = self.load_features(&spec_path)?;
            let feature = match self.select_feature(&features, &state) {
                Some(feature) => feature.clone(),
                None => return self.finish_without_feature(&features, &mut state, machine.as_ref()),
            };

            if state.iteration > max_iterations {
                info!(max_iterations, "Iteration budget exhausted");
                self.persist(&mut state, machine.as_ref())?;
                return Ok(LoopOutcome::IterationsExhausted {
                    iterations: max_iterations,
                });
            }

            if state.current_feature.as_deref() != Some(feature.id.as_str()) {
                info!(feature = %feature.id, priority = %feature.priority, "Selected feature");
                state.current_feature = Some(feature.id.clone());
                state.plan = None;
                state.previous_plan = None;
                state.validation_feedback = None;
                if let Some(machine) = machine.as_mut() {
                    machine.reset();
                }
            }
            self.persist(&mut state, machine.as_ref())?;

            let phase = machine.as_ref().map(PhaseMachine::phase);
            let handed = std::mem::take(&mut handoff);
            let carry = CarryOver {
                plan: state.plan.clone(),
                previous_plan: state.previous_plan.clone(),
                validation_feedback: state.validation_feedback.clone(),
                validation_attempt: machine.as_ref().map_or(0, PhaseMachine::validation_attempts),
                action_report: handed.action_report,
                user_question: handed.user_question,
                user_answer: handed.user_answer,
            };
            let tagged: &[PathBuf] = if first { &self.tagged } else { &[] };
            first = false;

            let context = self.builder.build(ContextRequest {
                iteration: state.iteration,
                phase,
                feature: Some(&feature),
                tagged,
                carry,
            })?;
            let prompt = self.prompts.render(&context)?;

            info!(iteration = state.iteration, ?phase, feature = %feature.id, "Invoking agent");
            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return self.stop_cancelled(&mut state, machine.as_ref());
                }
                result = self.agent.invoke(&prompt) => result?,
            };

            let response = parse_response(&raw).inspect_err(|e| {
                warn!(iteration = state.iteration, error = %e, "Unusable agent response");
            })?;
            debug!(action = %response.action, "LoopEngine::run: parsed response");

            let step = self
                .apply(&response, &feature, &mut state, machine.as_mut(), &mut handoff, &cancel)
                .await?;

            let (summary, finish) = match step {
                Step::Continue(summary) => (summary, None),
                Step::Finish(outcome, summary) => (summary, Some(outcome)),
                Step::Cancelled => return self.stop_cancelled(&mut state, machine.as_ref()),
            };

            self.record_progress(state.iteration, &feature.id, phase, &summary);
            info!(iteration = state.iteration, feature = %feature.id, %summary, "Iteration complete");
            state.iteration += 1;

            match finish {
                Some(LoopOutcome::Completed) => return self.finish_completed(),
                Some(outcome) => {
                    self.persist(&mut state, machine.as_ref())?;
                    return Ok(outcome);
                }
                None => self.persist(&mut state, machine.as_ref())?,
            }
        }
    }

    fn initial_state(&self, spec_path: &Path) -> ResumeState {
        let work_dir = &self.config.paths.work_dir;
        let restored = if self.fresh {
            info!("Ignoring persisted resume state");
            None
        } else {
            self.store.load_for(work_dir)
        };

        let phased = self.config.looping.phased;
        let mut state = restored.unwrap_or_else(|| {
            ResumeState::fresh(
                work_dir.clone(),
                spec_path.to_path_buf(),
                phased,
                self.config.looping.max_iterations,
            )
        });
        state.spec_path = spec_path.to_path_buf();

        // Mode may have changed since the state was written
        match (phased, state.phase) {
            (true, None) => state.phase = Some(Phase::Planning),
            (false, Some(_)) => state.phase = None,
            _ => {}
        }
        state
    }

    fn load_features(&self, spec_path: &Path) -> Result<FeatureList, LoopError> {
        if !spec_path.exists() {
            return Err(ContextError::SpecMissing {
                path: spec_path.to_path_buf(),
            }
            .into());
        }
        FeatureList::load(spec_path).map_err(LoopError::Features)
    }

    /// Keep working on the persisted feature, otherwise pick the next one
    fn select_feature<'a>(&self, features: &'a FeatureList, state: &ResumeState) -> Option<&'a Feature> {
        let pinned = self.config.looping.feature.as_deref();
        if pinned.is_none()
            && let Some(id) = state.current_feature.as_deref()
            && let Some(feature) = features.get(id)
            && !feature.passes
        {
            debug!(%id, "LoopEngine::select_feature: continuing current feature");
            return Some(feature);
        }
        features.select_next(pinned)
    }

    fn finish_without_feature(
        &self,
        features: &FeatureList,
        state: &mut ResumeState,
        machine: Option<&PhaseMachine>,
    ) -> Result<LoopOutcome, LoopError> {
        let pinned_done = self
            .config
            .looping
            .feature
            .as_deref()
            .and_then(|id| features.get(id))
            .is_some_and(|f| f.passes);

        if pinned_done || features.all_passing() {
            return self.finish_completed();
        }

        let pending = features.pending_ids();
        warn!(?pending, "No eligible features");
        self.persist(state, machine)?;
        Ok(LoopOutcome::NoEligibleFeatures { pending })
    }

    async fn apply(
        &self,
        response: &AgentResponse,
        feature: &Feature,
        state: &mut ResumeState,
        machine: Option<&mut PhaseMachine>,
        handoff: &mut Handoff,
        cancel: &CancellationToken,
    ) -> Result<Step, LoopError> {
        match response.action {
            Action::AskUser => {
                let question = response
                    .params()
                    .question
                    .or_else(|| response.message.clone())
                    .unwrap_or_else(|| "The agent needs input.".to_string());
                let answer = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(Step::Cancelled),
                    answer = self.user.ask(&question) => answer?,
                };
                handoff.user_question = Some(question);
                handoff.user_answer = Some(answer);
                Ok(Step::Continue("asked the user".to_string()))
            }
            Action::Done => self.apply_done(response, feature, state, machine),
            Action::ReadFiles | Action::WriteFile | Action::RunCommand | Action::Parallel => {
                let phase = machine.as_ref().map(|m| m.phase());
                let profile = match phase {
                    Some(phase) if !phase.allows_mutation() => ToolProfile::ReadOnly,
                    _ => ToolProfile::Full,
                };
                let ctx = ToolContext::new(self.config.paths.work_dir.clone(), cancel.child_token()).with_profile(profile);

                let result = self.executor.execute(response.sub_actions(), &ctx).await;
                handoff.action_report = Some(result.summary());
                if cancel.is_cancelled() {
                    return Ok(Step::Cancelled);
                }
                Ok(Step::Continue(format!(
                    "ran {} action(s), {} failed",
                    result.len(),
                    result.failed_count()
                )))
            }
        }
    }

    fn apply_done(
        &self,
        response: &AgentResponse,
        feature: &Feature,
        state: &mut ResumeState,
        machine: Option<&mut PhaseMachine>,
    ) -> Result<Step, LoopError> {
        if response.signals_completion() {
            return Ok(Step::Finish(
                LoopOutcome::Completed,
                "agent signalled overall completion".to_string(),
            ));
        }

        let Some(machine) = machine else {
            self.complete_feature(feature, state)?;
            return Ok(Step::Continue(format!("feature {} complete", feature.id)));
        };

        let event = match machine.phase() {
            Phase::Planning => PhaseEvent::PlanProposed,
            Phase::Validating => PhaseEvent::Verdict {
                valid: response.state_value("valid").and_then(|v| v.as_bool()).unwrap_or(false),
            },
            Phase::Executing => PhaseEvent::FeatureDone,
        };

        let step = match machine.advance(event) {
            Transition::Validate => {
                state.plan = Some(plan_text(response));
                Step::Continue("plan proposed".to_string())
            }
            Transition::Execute => {
                state.previous_plan = None;
                state.validation_feedback = None;
                Step::Continue("plan approved".to_string())
            }
            Transition::Replan { attempt } => {
                state.previous_plan = state.plan.take();
                state.validation_feedback = Some(feedback_text(response));
                Step::Continue(format!(
                    "plan rejected, re-plan {} of {}",
                    attempt, self.config.looping.max_validation_attempts
                ))
            }
            Transition::Exhausted { attempts } => {
                state.validation_feedback = Some(feedback_text(response));
                warn!(feature = %feature.id, attempts, "Validation attempts exhausted");
                Step::Finish(
                    LoopOutcome::ValidationExhausted {
                        feature: feature.id.clone(),
                        attempts,
                    },
                    "plan rejected, no re-plans left".to_string(),
                )
            }
            Transition::NextFeature => {
                self.complete_feature(feature, state)?;
                Step::Continue(format!("feature {} complete", feature.id))
            }
            Transition::Ignored => Step::Continue("done ignored".to_string()),
        };
        Ok(step)
    }

    fn complete_feature(&self, feature: &Feature, state: &mut ResumeState) -> Result<(), LoopError> {
        info!(feature = %feature.id, "Feature complete");
        FeatureList::mark_passing_on_disk(&self.config.spec_path(), &feature.id).map_err(LoopError::Features)?;
        state.current_feature = None;
        state.plan = None;
        state.previous_plan = None;
        state.validation_feedback = None;
        Ok(())
    }

    fn persist(&self, state: &mut ResumeState, machine: Option<&PhaseMachine>) -> Result<(), LoopError> {
        state.phase = machine.map(PhaseMachine::phase);
        state.validation_attempts = machine.map_or(0, PhaseMachine::validation_attempts);
        state.total_iterations = self.config.looping.max_iterations;
        self.store.save(state).map_err(LoopError::State)
    }

    fn stop_cancelled(&self, state: &mut ResumeState, machine: Option<&PhaseMachine>) -> Result<LoopOutcome, LoopError> {
        warn!(iteration = state.iteration, "Cancelled, saving resume state");
        self.persist(state, machine)?;
        Ok(LoopOutcome::Cancelled)
    }

    fn finish_completed(&self) -> Result<LoopOutcome, LoopError> {
        info!("All features complete");
        self.store.clear().map_err(LoopError::State)?;
        Ok(LoopOutcome::Completed)
    }

    fn record_progress(&self, iteration: u32, feature: &str, phase: Option<Phase>, summary: &str) {
        let entry = progress_entry(iteration, Some(feature), phase.map(|p| p.as_str()), summary);
        if let Err(e) = append_progress(&self.config.progress_path(), &entry) {
            warn!(error = %format!("{:#}", e), "Failed to append progress log");
        }
    }
}

fn plan_text(response: &AgentResponse) -> String {
    response
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| response.state_value("plan").and_then(|v| v.as_str()).map(str::to_string))
        .unwrap_or_else(|| "(no plan text provided)".to_string())
}

fn feedback_text(response: &AgentResponse) -> String {
    response
        .state_value("feedback")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| response.message.clone())
        .unwrap_or_else(|| "(no feedback provided)".to_string())
}
