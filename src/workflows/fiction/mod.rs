//! Character-driven story generation with two human approval gates.
//!
//! 1. `collect-character-data` waits for the character data to be approved.
//! 2. `build-character-profile` has the agent expand it into a profile.
//! 3. `collect-story-parameters` waits for genre, setting and premise.
//! 4. `generate-fiction-story` has the agent write the story.

pub mod prompts;
pub mod schemas;
pub mod types;

use async_trait::async_trait;

use crate::engine::error::EngineError;
use crate::protocol::{ActionType, SuspendEnvelope, SuspendReason};
use crate::workflow::{Step, StepContext, StepError, StepOutcome, StepSpec, WorkflowDefinition};

use self::types::*;

pub const WORKFLOW_ID: &str = "fiction-generation-workflow";

pub const COLLECT_CHARACTER_DATA: &str = "collect-character-data";
pub const BUILD_CHARACTER_PROFILE: &str = "build-character-profile";
pub const COLLECT_STORY_PARAMETERS: &str = "collect-story-parameters";
pub const GENERATE_FICTION_STORY: &str = "generate-fiction-story";

pub fn workflow() -> Result<WorkflowDefinition, EngineError> {
    WorkflowDefinition::builder(WORKFLOW_ID)
        .description("Develop a character, then write a multi-chapter story around them")
        .input_schema(schemas::character_data())
        .output_schema(schemas::story())
        .step(
            StepSpec::typed(COLLECT_CHARACTER_DATA, CollectCharacterData)
                .input_schema(schemas::character_data())
                .output_schema(schemas::character_data())
                .resume_schema(schemas::character_review())
                .suspend_schema(schemas::character_suspend()),
        )
        .step(
            StepSpec::typed(BUILD_CHARACTER_PROFILE, BuildCharacterProfile)
                .input_schema(schemas::character_data())
                .output_schema(schemas::character_profile()),
        )
        .step(
            StepSpec::typed(COLLECT_STORY_PARAMETERS, CollectStoryParameters)
                .input_schema(schemas::character_profile())
                .output_schema(schemas::story_brief())
                .resume_schema(schemas::story_request())
                .suspend_schema(schemas::story_suspend()),
        )
        .step(
            StepSpec::typed(GENERATE_FICTION_STORY, GenerateFictionStory)
                .input_schema(schemas::story_brief())
                .output_schema(schemas::story()),
        )
        .build()
}

pub struct CollectCharacterData;

#[async_trait]
impl Step for CollectCharacterData {
    type Input = CharacterData;
    type Output = CharacterData;
    type Resume = CharacterReview;

    async fn run(
        &self,
        input: CharacterData,
        resume: Option<CharacterReview>,
        ctx: &StepContext,
    ) -> StepOutcome<CharacterData> {
        if resume.is_some_and(|r| r.review_status == ReviewStatus::Approved) {
            return StepOutcome::Continue(input);
        }

        let partial = match serde_json::to_value(&input) {
            Ok(v) => v,
            Err(e) => return StepOutcome::Fail(StepError::step(e.to_string())),
        };
        let mut envelope = SuspendEnvelope::new(
            SuspendReason::AwaitingApproval,
            "Review the character data and approve it to start character development.",
        )
        .with_action(
            ActionType::Approve,
            "Resume with reviewStatus 'approved' to continue.",
        )
        .with_required_inputs(["reviewStatus"])
        .with_context("character", &input.basic_info.name, COLLECT_CHARACTER_DATA);
        envelope.state_snapshot = ctx.snapshot(Some(partial));

        StepOutcome::Suspend(envelope)
    }
}

pub struct BuildCharacterProfile;

#[async_trait]
impl Step for BuildCharacterProfile {
    type Input = CharacterData;
    type Output = CharacterProfile;
    type Resume = serde_json::Value;

    async fn run(
        &self,
        input: CharacterData,
        _resume: Option<serde_json::Value>,
        ctx: &StepContext,
    ) -> StepOutcome<CharacterProfile> {
        let prompt = prompts::character_prompt(&input);
        match ctx.generate(&prompt).await {
            Ok(text) => StepOutcome::Continue(CharacterProfile {
                character_profile: text,
                character_name: input.basic_info.name,
            }),
            Err(e) => StepOutcome::Fail(e.into()),
        }
    }
}

pub struct CollectStoryParameters;

#[async_trait]
impl Step for CollectStoryParameters {
    type Input = CharacterProfile;
    type Output = StoryBrief;
    type Resume = StoryRequest;

    async fn run(
        &self,
        input: CharacterProfile,
        resume: Option<StoryRequest>,
        ctx: &StepContext,
    ) -> StepOutcome<StoryBrief> {
        if let Some(StoryRequest {
            review_status: ReviewStatus::Approved,
            story_parameters: Some(story_parameters),
        }) = resume
        {
            return StepOutcome::Continue(StoryBrief {
                character_profile: input.character_profile,
                character_name: input.character_name,
                story_parameters,
            });
        }

        let mut envelope = SuspendEnvelope::new(
            SuspendReason::AwaitingHumanInput,
            "The character profile is ready. Provide story parameters to generate the story.",
        )
        .with_action(
            ActionType::SupplyData,
            "Resume with reviewStatus 'approved' and storyParameters \
             {genre, setting, plotPremise, tone?, targetAudience?, chapterCount?, additionalNotes?}.",
        )
        .with_required_inputs(["reviewStatus", "storyParameters"])
        .with_context("character", &input.character_name, COLLECT_STORY_PARAMETERS);
        envelope.state_snapshot = ctx.snapshot(Some(serde_json::json!({
            "characterProfile": input.character_profile,
        })));

        StepOutcome::Suspend(envelope)
    }
}

pub struct GenerateFictionStory;

#[async_trait]
impl Step for GenerateFictionStory {
    type Input = StoryBrief;
    type Output = Story;
    type Resume = serde_json::Value;

    async fn run(
        &self,
        input: StoryBrief,
        _resume: Option<serde_json::Value>,
        ctx: &StepContext,
    ) -> StepOutcome<Story> {
        let prompt = prompts::story_prompt(&input);
        let text = match ctx.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => return StepOutcome::Fail(e.into()),
        };

        let parsed = prompts::parse_story(&text);
        StepOutcome::Continue(Story {
            title: parsed
                .title
                .unwrap_or_else(|| format!("{}'s Story", input.character_name)),
            story: text,
            chapter_breakdown: (!parsed.chapters.is_empty()).then_some(parsed.chapters),
        })
    }
}
