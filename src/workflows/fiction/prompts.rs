use std::fmt::Write as _;

use super::types::{CharacterData, ChapterSummary, StoryBrief};

pub const DEFAULT_CHAPTER_COUNT: u32 = 3;

/// Persona for the character development step.
pub const CHARACTER_DEVELOPER_INSTRUCTIONS: &str = "\
You are a character development specialist for fiction writers.
- Build realistic, internally consistent characters with clear goals, motivations and fears.
- Give every strength a matching flaw and at least one internal conflict.
- Trace a believable arc from the starting state to the ending state.
- Give the character a distinct voice and avoid stereotypes.
";

/// Persona for the story writing step.
pub const FICTION_WRITER_INSTRUCTIONS: &str = "\
You are an experienced fiction writer.
- Keep characters, setting and established facts consistent throughout.
- Give the story a clear structure with a beginning, rising tension and a resolution.
- Show rather than tell; let dialogue reveal character and move the plot.
- Pace each chapter deliberately and end it with momentum into the next.
";

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

fn or_unspecified(value: Option<&str>) -> &str {
    value.unwrap_or("Not specified")
}

/// Prompt asking the agent to expand structured character data into a profile.
pub fn character_prompt(c: &CharacterData) -> String {
    let info = &c.basic_info;
    let mut p = String::from(CHARACTER_DEVELOPER_INSTRUCTIONS);
    p.push('\n');

    let _ = writeln!(p, "Develop the following character into a complete profile a novelist could write from.");
    let _ = writeln!(p, "Answer in prose, organised by the same headings.\n");

    let _ = writeln!(p, "## Identity");
    let _ = writeln!(p, "Name: {}", info.name);
    let _ = writeln!(p, "Role: {}", info.role);
    let age = info.age.map(|a| a.to_string());
    let _ = writeln!(p, "Age: {}", or_unspecified(age.as_deref()));
    let _ = writeln!(p, "Gender: {}", or_unspecified(info.gender.as_deref()));
    let _ = writeln!(p, "Occupation: {}", or_unspecified(info.occupation.as_deref()));
    let _ = writeln!(p, "Background: {}\n", or_unspecified(info.background.as_deref()));

    let pers = &c.personality;
    let _ = writeln!(p, "## Personality");
    let _ = writeln!(p, "Traits: {}", list(&pers.traits));
    let _ = writeln!(p, "Strengths: {}", list(&pers.strengths));
    let _ = writeln!(p, "Flaws: {}", list(&pers.flaws));
    let _ = writeln!(p, "Fears: {}", list(&pers.fears));
    let _ = writeln!(p, "Desires: {}", list(&pers.desires));
    let _ = writeln!(p, "Inner conflicts: {}\n", list(&pers.internal_conflicts));

    let mot = &c.motivations;
    let _ = writeln!(p, "## Motivations");
    let _ = writeln!(p, "Short-term goals: {}", list(&mot.short_term_goals));
    let _ = writeln!(p, "Long-term goals: {}", list(&mot.long_term_goals));
    let _ = writeln!(p, "Driving force: {}\n", or_unspecified(mot.driving_force.as_deref()));

    let back = &c.backstory;
    let _ = writeln!(p, "## Backstory");
    let _ = writeln!(p, "Origin: {}", or_unspecified(back.origin.as_deref()));
    let _ = writeln!(p, "Key events: {}", list(&back.key_life_events));
    let _ = writeln!(p, "Turning points: {}\n", list(&back.trauma_or_turning_points));

    let _ = writeln!(p, "## Relationships");
    if c.relationships.is_empty() {
        let _ = writeln!(p, "None");
    }
    for r in &c.relationships {
        let _ = writeln!(
            p,
            "- {} ({}): {}",
            r.character_name,
            r.relationship_type,
            r.emotional_dynamic.as_deref().unwrap_or("no details")
        );
    }
    p.push('\n');

    let arc = &c.character_arc;
    let _ = writeln!(p, "## Arc");
    let _ = writeln!(p, "Starts as: {}", arc.starting_state);
    let _ = writeln!(p, "Challenges: {}", list(&arc.challenges));
    let _ = writeln!(p, "Transformation: {}", or_unspecified(arc.transformation.as_deref()));
    let _ = writeln!(p, "Ends as: {}\n", or_unspecified(arc.ending_state.as_deref()));

    let voice = &c.dialogue_style;
    let vocabulary = voice.vocabulary_level.map(|v| v.to_string());
    let _ = writeln!(p, "## Voice");
    let _ = writeln!(p, "Tone: {}", or_unspecified(voice.tone.as_deref()));
    let _ = writeln!(p, "Speech patterns: {}", list(&voice.speech_patterns));
    let _ = writeln!(p, "Vocabulary: {}\n", or_unspecified(vocabulary.as_deref()));

    let func = &c.narrative_function;
    let _ = writeln!(p, "## Narrative function");
    let _ = writeln!(p, "Purpose: {}", func.story_purpose);
    let _ = writeln!(p, "Themes: {}", list(&func.themes_represented));
    let _ = writeln!(p, "Conflicts: {}", list(&func.key_conflicts_involved));

    if let Some(meta) = &c.metadata {
        let _ = writeln!(p, "\n## Notes");
        let _ = writeln!(p, "Genre: {}", or_unspecified(meta.genre.as_deref()));
        let _ = writeln!(p, "World: {}", or_unspecified(meta.world_setting.as_deref()));
        let _ = writeln!(p, "Notes: {}", meta.notes.as_deref().unwrap_or("None"));
    }

    p
}

/// Prompt asking the agent for a complete story in the `TITLE:` / `Chapter N:` format.
pub fn story_prompt(brief: &StoryBrief) -> String {
    let params = &brief.story_parameters;
    let chapters = params.chapter_count.unwrap_or(DEFAULT_CHAPTER_COUNT);
    let genre = params.genre.replace('_', " ");
    let audience = params
        .target_audience
        .as_deref()
        .map(|a| a.replace('_', " "))
        .unwrap_or_else(|| "General".to_string());

    let mut p = String::from(FICTION_WRITER_INSTRUCTIONS);
    p.push('\n');
    let _ = writeln!(p, "Write a complete {} story in {} chapters.\n", genre, chapters);

    let _ = writeln!(p, "## Main character: {}", brief.character_name);
    let _ = writeln!(p, "{}\n", brief.character_profile.trim());

    let _ = writeln!(p, "## Story");
    let _ = writeln!(p, "Setting: {}", params.setting);
    let _ = writeln!(p, "Premise: {}", params.plot_premise);
    let _ = writeln!(p, "Tone: {}", or_unspecified(params.tone.as_deref()));
    let _ = writeln!(p, "Audience: {}", audience);
    let _ = writeln!(p, "Notes: {}\n", params.additional_notes.as_deref().unwrap_or("None"));

    let _ = writeln!(p, "## Requirements");
    let _ = writeln!(p, "- Keep {} consistent with the profile above.", brief.character_name);
    let _ = writeln!(p, "- Open by grounding the reader in the setting.");
    let _ = writeln!(p, "- Raise the stakes through the middle chapters and resolve them in the last.");
    let _ = writeln!(p, "- Reveal emotion and change through action and dialogue.\n");

    let _ = writeln!(p, "## Format");
    let _ = writeln!(p, "First line: TITLE: <story title>");
    let _ = writeln!(p, "Start each chapter on its own line as: Chapter <number>: <chapter title>");

    p
}

/// Parsed agent reply: the title line and any chapter headings.
pub struct ParsedStory {
    pub title: Option<String>,
    pub chapters: Vec<ChapterSummary>,
}

/// Extracts `TITLE:` and `Chapter N: title` lines from a story reply.
pub fn parse_story(text: &str) -> ParsedStory {
    let mut title = None;
    let mut chapters = Vec::new();

    for line in text.lines() {
        let line = line.trim().trim_matches(|c| c == '*' || c == '#').trim();

        if title.is_none()
            && let Some(rest) = line.strip_prefix("TITLE:")
        {
            let rest = rest.trim();
            if !rest.is_empty() {
                title = Some(rest.to_string());
            }
            continue;
        }

        if let Some((number, chapter_title)) = chapter_heading(line) {
            chapters.push(ChapterSummary {
                chapter_number: number,
                summary: format!("Chapter {} of the story.", number),
                chapter_title,
            });
        }
    }

    ParsedStory { title, chapters }
}

/// Matches `Chapter <digits>: <title>` anywhere in a line, ignoring case.
fn chapter_heading(line: &str) -> Option<(u32, String)> {
    let lower = line.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(pos) = lower[search_from..].find("chapter") {
        let start = search_from + pos;
        search_from = start + "chapter".len();

        let rest = &line[search_from..];
        let after_space = rest.trim_start();
        if after_space.len() == rest.len() {
            continue;
        }

        let digits: String = after_space.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            continue;
        }
        let Some(tail) = after_space[digits.len()..].strip_prefix(':') else {
            continue;
        };
        let chapter_title = tail.trim().trim_end_matches('*').trim();
        if chapter_title.is_empty() {
            continue;
        }
        if let Ok(number) = digits.parse() {
            return Some((number, chapter_title.to_string()));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_chapters() {
        let text = "TITLE: The Glass Orchard\n\nChapter 1: Seeds\nIt began.\n\nChapter 2: Frost\nIt ended.";
        let parsed = parse_story(text);
        assert_eq!(parsed.title.as_deref(), Some("The Glass Orchard"));
        assert_eq!(parsed.chapters.len(), 2);
        assert_eq!(parsed.chapters[0].chapter_number, 1);
        assert_eq!(parsed.chapters[0].chapter_title, "Seeds");
        assert_eq!(parsed.chapters[1].summary, "Chapter 2 of the story.");
    }

    #[test]
    fn tolerates_markdown_and_case() {
        let text = "**TITLE: Ashfall**\n## CHAPTER 3: The Return **";
        let parsed = parse_story(text);
        assert_eq!(parsed.title.as_deref(), Some("Ashfall"));
        assert_eq!(parsed.chapters[0].chapter_number, 3);
        assert_eq!(parsed.chapters[0].chapter_title, "The Return");
    }

    #[test]
    fn each_prompt_opens_with_its_persona() {
        let character: CharacterData = serde_json::from_value(serde_json::json!({
            "basicInfo": { "name": "Ilse", "role": "protagonist" },
            "personality": { "traits": ["wry"] },
            "characterArc": { "startingState": "alone" },
            "narrativeFunction": { "storyPurpose": "witness" }
        }))
        .unwrap();
        let prompt = character_prompt(&character);
        assert!(prompt.starts_with(CHARACTER_DEVELOPER_INSTRUCTIONS));
        assert!(!prompt.contains(FICTION_WRITER_INSTRUCTIONS));

        let brief = StoryBrief {
            character_name: "Ilse".to_string(),
            character_profile: "Ilse keeps lighthouses.".to_string(),
            story_parameters: serde_json::from_value(serde_json::json!({
                "genre": "literary_fiction",
                "setting": "a northern coast",
                "plotPremise": "the light goes out"
            }))
            .unwrap(),
        };
        let prompt = story_prompt(&brief);
        assert!(prompt.starts_with(FICTION_WRITER_INSTRUCTIONS));
        assert!(!prompt.contains(CHARACTER_DEVELOPER_INSTRUCTIONS));
    }

    #[test]
    fn ignores_prose_mentions_of_chapters() {
        let parsed = parse_story("A new chapter in her life.\nChapterhouse: no\nChapter two: words");
        assert!(parsed.title.is_none());
        assert!(parsed.chapters.is_empty());
    }
}
