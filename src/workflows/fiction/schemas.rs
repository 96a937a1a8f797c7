//! JSON Schemas for the fiction workflow's steps.

use serde_json::{Value, json};

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

pub fn character_data() -> Value {
    json!({
        "type": "object",
        "required": ["basicInfo", "characterArc", "narrativeFunction"],
        "properties": {
            "characterId": { "type": "string" },
            "basicInfo": {
                "type": "object",
                "required": ["name", "role"],
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "role": {
                        "type": "string",
                        "enum": ["protagonist", "antagonist", "supporting", "minor",
                                 "mentor", "foil", "sidekick", "other"]
                    },
                    "age": { "type": "integer", "minimum": 0 },
                    "gender": { "type": "string" },
                    "occupation": { "type": "string" },
                    "background": { "type": "string" }
                }
            },
            "personality": {
                "type": "object",
                "properties": {
                    "traits": string_list(),
                    "strengths": string_list(),
                    "flaws": string_list(),
                    "fears": string_list(),
                    "desires": string_list(),
                    "internalConflicts": string_list()
                }
            },
            "motivations": {
                "type": "object",
                "properties": {
                    "shortTermGoals": string_list(),
                    "longTermGoals": string_list(),
                    "drivingForce": { "type": "string" }
                }
            },
            "backstory": {
                "type": "object",
                "properties": {
                    "origin": { "type": "string" },
                    "keyLifeEvents": string_list(),
                    "traumaOrTurningPoints": string_list(),
                    "relationshipsInfluence": string_list()
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["characterName", "relationshipType"],
                    "properties": {
                        "characterName": { "type": "string" },
                        "relationshipType": { "type": "string" },
                        "emotionalDynamic": { "type": "string" },
                        "conflictLevel": { "type": "string", "enum": ["low", "medium", "high"] }
                    }
                }
            },
            "characterArc": {
                "type": "object",
                "required": ["startingState"],
                "properties": {
                    "startingState": { "type": "string" },
                    "challenges": string_list(),
                    "transformation": { "type": "string" },
                    "endingState": { "type": "string" }
                }
            },
            "dialogueStyle": {
                "type": "object",
                "properties": {
                    "tone": { "type": "string" },
                    "speechPatterns": string_list(),
                    "vocabularyLevel": {
                        "type": "string",
                        "enum": ["simple", "casual", "formal", "technical", "poetic"]
                    }
                }
            },
            "narrativeFunction": {
                "type": "object",
                "required": ["storyPurpose"],
                "properties": {
                    "storyPurpose": { "type": "string" },
                    "themesRepresented": string_list(),
                    "keyConflictsInvolved": string_list()
                }
            },
            "metadata": {
                "type": "object",
                "properties": {
                    "genre": { "type": "string" },
                    "worldSetting": { "type": "string" },
                    "notes": { "type": "string" }
                }
            }
        }
    })
}

fn review_status() -> Value {
    json!({
        "type": "string",
        "enum": ["pending", "approved", "approved_with_changes", "needs_revision", "rejected"]
    })
}

pub fn character_review() -> Value {
    json!({
        "type": "object",
        "required": ["reviewStatus"],
        "properties": {
            "reviewStatus": review_status(),
            "feedback": { "type": "string" }
        }
    })
}

/// Envelope constraints shared by both gates: the reason, the action and
/// the resume conditions must be present, and the action must name fields.
fn gate_envelope(required: &[&str]) -> Value {
    json!({
        "type": "object",
        "required": ["reason", "description", "requiredAction", "resumeConditions", "stateSnapshot"],
        "properties": {
            "requiredAction": {
                "type": "object",
                "required": ["actionType", "instructions", "requiredFields"],
                "properties": {
                    "requiredFields": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1
                    }
                }
            },
            "resumeConditions": {
                "type": "object",
                "required": ["requiredInputs"],
                "properties": {
                    "requiredInputs": {
                        "type": "array",
                        "items": { "type": "string", "enum": required },
                        "minItems": required.len()
                    }
                }
            },
            "context": {
                "type": "object",
                "required": ["entityType", "entityId", "workflowStage"]
            }
        }
    })
}

pub fn character_suspend() -> Value {
    gate_envelope(&["reviewStatus"])
}

pub fn character_profile() -> Value {
    json!({
        "type": "object",
        "required": ["characterProfile", "characterName"],
        "properties": {
            "characterProfile": { "type": "string" },
            "characterName": { "type": "string" }
        }
    })
}

pub fn story_parameters() -> Value {
    json!({
        "type": "object",
        "required": ["genre", "setting", "plotPremise"],
        "properties": {
            "genre": { "type": "string", "minLength": 1 },
            "setting": { "type": "string", "minLength": 1 },
            "plotPremise": { "type": "string", "minLength": 1 },
            "tone": { "type": "string" },
            "targetAudience": { "type": "string" },
            "chapterCount": { "type": "integer", "minimum": 1, "maximum": 10 },
            "additionalNotes": { "type": "string" }
        }
    })
}

pub fn story_request() -> Value {
    json!({
        "type": "object",
        "required": ["reviewStatus", "storyParameters"],
        "properties": {
            "reviewStatus": review_status(),
            "storyParameters": story_parameters()
        }
    })
}

pub fn story_suspend() -> Value {
    gate_envelope(&["reviewStatus", "storyParameters"])
}

pub fn story_brief() -> Value {
    json!({
        "type": "object",
        "required": ["characterProfile", "characterName", "storyParameters"],
        "properties": {
            "characterProfile": { "type": "string" },
            "characterName": { "type": "string" },
            "storyParameters": story_parameters()
        }
    })
}

pub fn story() -> Value {
    json!({
        "type": "object",
        "required": ["title", "story"],
        "properties": {
            "title": { "type": "string" },
            "story": { "type": "string" },
            "chapterBreakdown": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["chapterNumber", "chapterTitle", "summary"],
                    "properties": {
                        "chapterNumber": { "type": "integer", "minimum": 1 },
                        "chapterTitle": { "type": "string" },
                        "summary": { "type": "string" }
                    }
                }
            }
        }
    })
}
