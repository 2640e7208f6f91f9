//! Prompt templates
//!
//! Every oracle request an agent makes is built here so the wording lives in
//! one place.

/// Reply sentinel meaning "nothing to add"
pub const NOTHING_SENTINEL: &str = "NOTHING";

pub fn participation(agent_id: &str, own_context: &str, session_context: &str, message: &str) -> String {
    format!(
        "Your recent conversation:\n{own_context}\n\n\
         Shared conversation so far:\n{session_context}\n\n\
         New message: {message}\n\n\
         You are agent {agent_id}. Decide whether you should join this conversation. Consider:\n\
         1. How relevant and important the message is\n\
         2. Whether you would move the discussion forward\n\
         3. Whether you can contribute something of value\n\n\
         Answer only true or false."
    )
}

pub fn reply_system(
    agent_id: &str,
    is_leader: bool,
    recent_context: &str,
    source: Option<&str>,
    strength: f64,
    session_context: &str,
) -> String {
    let role = if is_leader {
        "You are the leader of the current task."
    } else {
        "You are a team member."
    };
    let speaker = source.unwrap_or("user");
    format!(
        "You are agent {agent_id}. {role}\n\
         Your recent conversation:\n{recent_context}\n\
         Shared conversation:\n{session_context}\n\
         Connection strength with the speaker ({speaker}): {strength:.2}\n\n\
         Reply naturally and coherently given the context.\n\
         If an interesting topic comes up, feel free to extend it.\n\
         If you see a problem, propose a solution."
    )
}

pub fn thought(agent_id: &str, recent_context: &str) -> String {
    format!(
        "You are agent {agent_id}.\n\
         Recent conversation:\n{recent_context}\n\n\
         As a participant, if there is something you want to say, just say it.\n\
         If you have nothing to add, reply \"{NOTHING_SENTINEL}\".\n\n\
         Keep in mind:\n\
         1. Keep the conversation natural\n\
         2. Do not repeat what others already said\n\
         3. You may raise a new topic\n\
         4. You may suggest improvements to other people's ideas"
    )
}

pub fn analysis_system() -> &'static str {
    r#"You are an assistant that analyses a user message and identifies its conversational intent.
Decide whether other agents should take part in the conversation.

Output format:
{
  "type": "chat/task/question",
  "needsCollaboration": true/false,
  "topic": "conversation topic",
  "relevantSkills": ["skill1", "skill2"],
  "suggestedParticipants": 2,
  "priority": "high/medium/low"
}"#
}

pub fn plan_system() -> &'static str {
    r#"As the owner of this task, create a detailed execution plan.
Take into account:
1. Task complexity and expected completion time
2. Dependencies between sub-steps
3. Each collaborator's expertise and current workload
4. Possible risks and how to mitigate them

Output format:
{
  "steps": [
    {
      "id": "step id",
      "description": "concrete step",
      "assignedTo": "owner",
      "estimatedTime": "estimate",
      "dependencies": ["step id"],
      "status": "pending"
    }
  ],
  "risks": [
    { "description": "risk", "mitigation": "mitigation" }
  ],
  "checkpoints": [
    { "description": "checkpoint", "criteria": ["criterion 1", "criterion 2"] }
  ]
}"#
}

pub fn collaboration_invite(message: &str, topic: &str, skills: &[String]) -> String {
    format!(
        "I have been selected to take part in the task: \"{message}\".\nTopic: {topic}\nRequired skills: {}",
        skills.join(", ")
    )
}

pub fn progress_report(description: &str, ratio: f64) -> String {
    format!(
        "Progress on task \"{description}\" is {:.1}%. Please share your suggestions or any help you need.",
        ratio * 100.0
    )
}

pub fn apology(agent_id: &str) -> String {
    format!("[{agent_id}] ran into a technical problem.")
}
