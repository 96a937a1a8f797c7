use serde::{Deserialize, Serialize};

/// Structured character description supplied when a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<String>,
    pub basic_info: BasicInfo,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub motivations: Motivations,
    #[serde(default)]
    pub backstory: Backstory,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    pub character_arc: CharacterArc,
    #[serde(default)]
    pub dialogue_style: DialogueStyle,
    pub narrative_function: NarrativeFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CharacterMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterRole {
    Protagonist,
    Antagonist,
    Supporting,
    Minor,
    Mentor,
    Foil,
    Sidekick,
    Other,
}

impl std::fmt::Display for CharacterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CharacterRole::Protagonist => "protagonist",
            CharacterRole::Antagonist => "antagonist",
            CharacterRole::Supporting => "supporting",
            CharacterRole::Minor => "minor",
            CharacterRole::Mentor => "mentor",
            CharacterRole::Foil => "foil",
            CharacterRole::Sidekick => "sidekick",
            CharacterRole::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
    pub name: String,
    pub role: CharacterRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Personality {
    pub traits: Vec<String>,
    pub strengths: Vec<String>,
    pub flaws: Vec<String>,
    pub fears: Vec<String>,
    pub desires: Vec<String>,
    pub internal_conflicts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Motivations {
    pub short_term_goals: Vec<String>,
    pub long_term_goals: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driving_force: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Backstory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub key_life_events: Vec<String>,
    pub trauma_or_turning_points: Vec<String>,
    pub relationships_influence: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub character_name: String,
    pub relationship_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_dynamic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_level: Option<ConflictLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterArc {
    pub starting_state: String,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyLevel {
    Simple,
    Casual,
    Formal,
    Technical,
    Poetic,
}

impl std::fmt::Display for VocabularyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VocabularyLevel::Simple => "simple",
            VocabularyLevel::Casual => "casual",
            VocabularyLevel::Formal => "formal",
            VocabularyLevel::Technical => "technical",
            VocabularyLevel::Poetic => "poetic",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    pub speech_patterns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_level: Option<VocabularyLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeFunction {
    pub story_purpose: String,
    #[serde(default)]
    pub themes_represented: Vec<String>,
    #[serde(default)]
    pub key_conflicts_involved: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_setting: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Reviewer verdict carried by both approval gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    ApprovedWithChanges,
    NeedsRevision,
    Rejected,
}

/// Resume payload for the character review gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterReview {
    pub review_status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
    pub character_profile: String,
    pub character_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryParameters {
    pub genre: String,
    pub setting: String,
    pub plot_premise: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

/// Resume payload for the story parameter gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRequest {
    pub review_status: ReviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_parameters: Option<StoryParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryBrief {
    pub character_profile: String,
    pub character_name: String,
    pub story_parameters: StoryParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub chapter_number: u32,
    pub chapter_title: String,
    pub summary: String,
}

/// Final result of the fiction workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub title: String,
    pub story: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_breakdown: Option<Vec<ChapterSummary>>,
}
