//! Prompt templates for the four task endpoints.
//!
//! These are the verbatim instructions handed to the agent as its final
//! CLI argument. Wording is deliberately rigid: downstream automation posts
//! the agent's responses into Jira comments, hence the repeated plain-text
//! admonitions, and the epic template pins the exact JSON shape the
//! reconciler later mines back out of `resultText`.

use serde_json::Value;

/// Planning prompt: explore the codebase and produce an implementation
/// plan without touching anything. A non-empty `comment` means the user is
/// responding to an earlier plan, which the agent is told about.
pub fn plan_prompt(summary: &str, description: &str, comment: Option<&str>) -> String {
    let comment_block = match comment {
        Some(comment) if !comment.is_empty() => {
            format!("The user has commented on the initial plan: `{comment}`\n\n")
        }
        _ => String::new(),
    };
    format!(
        "Take time to understand the existing codebase:\n\
         1. Explore the directory structure\n\
         2. For any files that seem relevant to this user story, read and understand them\n\
         3. Look for related functionality, patterns, and conventions used in the project\n\
         4. Identify which parts of the code will need to be modified or extended\n\n\
         Now, think how you would handle the following user story:\n\
         Summary: `{summary}`\n\
         Description: `{description}`\n\n\
         {comment_block}\
         You MUST NOT perform the implementation of the user story just yet. You MUST only plan the implementation.\n\n\
         In your response, please include:\n\
         1. A summary of the relevant existing code you found\n\
         2. Your plan for implementing the user story\n\
         3. Any potential challenges or considerations\n\n\
         IMPORTANT: Do not use any markdown styling (such as bold, italic, headers, bullet points) in your responses as they will be posted in Jira comments. Use plain text only."
    )
}

/// Execution prompt: implement an approved plan on a fresh branch named
/// after the issue, ending in a pushed commit and a pull request.
pub fn act_prompt(plan: &str, issue_key: &str) -> String {
    format!(
        "Execute the following plan: `{plan}`\n\n\
         Please follow these steps to implement the changes:\n\
         1. Make sure you're in the repository directory (/app)\n\
         2. Run 'git status' to verify the repository state\n\
         3. Create a new branch with 'git checkout -b {issue_key}' (note: the code is already checked out by the container, you just need to create a new branch)\n\
         4. Make all the necessary modifications according to the plan\n\
         5. Run 'npm run build' to check for any build errors\n\
         6. Run appropriate tests to ensure your changes work correctly\n\
         7. Fix any build errors or test failures before proceeding\n\
         8. Add all changes with 'git add .'\n\
         9. Write a descriptive commit message that explains WHAT changes were made and WHY. The message should start with '{issue_key}:' followed by a concise summary of the implementation. Run: git commit -m \"{issue_key}: [Write a meaningful description of your changes here]\"\n\
         10. Push your branch with 'git push -u origin {issue_key}'\n\
         11. Create a pull request using GitHub CLI with the command: 'gh pr create --title \"{issue_key}: [Write a clear, specific title describing the feature or fix]\" --body \"[Write a detailed description that explains:\n\
         - What changes were made\n\
         - Why these changes were necessary\n\
         - How the implementation works\n\
         - Any testing performed\n\
         - Any additional notes for reviewers]\" --base main'\n\
         12. Exit only after all these steps are completed\n\n\
         IMPORTANT: For both the commit message and pull request, replace the placeholder text in brackets with actual meaningful content. Do not include the brackets in your final messages. The descriptions should be specific to the actual changes you made, not generic placeholders.\n\n\
         IMPORTANT: Do not use any markdown styling (such as bold, italic, headers, bullet points) in your responses as they will be posted in Jira comments. Use plain text only.\n\n"
    )
}

/// Review-feedback prompt: address PR comments on the existing issue
/// branch. The comments payload is embedded pretty-printed so the agent
/// sees structure (authors, file paths, line numbers) rather than a blob.
pub fn feedback_prompt(issue_key: &str, comments: &Value) -> String {
    let comments_json =
        serde_json::to_string_pretty(comments).unwrap_or_else(|_| comments.to_string());
    format!(
        "You need to address the following PR review comments for issue '{issue_key}':\n\n\
         ```\n{comments_json}\n```\n\n\
         Please follow these steps to implement the requested changes:\n\
         1. Make sure you're in the repository directory (/app)\n\
         2. Run 'git status' to verify the repository state\n\
         3. Run 'git checkout {issue_key}' to switch to the branch for this issue\n\
         4. Carefully review each comment and make all necessary changes to address them\n\
         5. For file-specific comments, locate the exact files and line numbers mentioned\n\
         6. For general PR comments, consider how they apply to the overall implementation\n\
         7. Run 'npm run build' to check for any build errors\n\
         8. Run appropriate tests to ensure your changes work correctly\n\
         9. Fix any build errors or test failures before proceeding\n\
         10. Add all changes with 'git add .'\n\
         11. Commit your changes with a descriptive message: git commit -m \"{issue_key}: Address PR feedback - [brief description of changes]\"\n\
         12. Push your changes with 'git push origin {issue_key}'\n\
         13. Exit only after all these steps are completed\n\n\
         IMPORTANT: Make sure to address ALL comments thoroughly. If any comment is unclear or you're unsure how to address it, explain your understanding and approach in your response.\n\n\
         CRITICAL: NEVER create a new branch. ALWAYS use the existing branch '{issue_key}' for all your changes. Do NOT use 'git checkout -b' or any command that would create a new branch.\n\n\
         IMPORTANT: Do not use any markdown styling (such as bold, italic, headers, bullet points) in your responses as they will be posted in Jira comments. Use plain text only.\n\n"
    )
}

/// The literal response-format example appended to the epic prompt. The
/// reconciler's fenced-array extraction depends on the agent reproducing
/// this shape.
const STORY_FORMAT_EXAMPLE: &str = r#"```json
[
  {
    "id": "US-1",
    "title": "As a <role> I should be able to <action> on <subject>",
    "description": "Detailed description...",
    "depends_on": null
  },
  {
    "id": "US-2",
    "title": "As a <role> I should be able to <action> on <subject>",
    "description": "Detailed description...",
    "depends_on": "US-1"
  },
  ...
]
```
"#;

/// Epic breakdown prompt: explore the codebase, write user stories, and
/// finish with a fenced JSON array in the pinned format.
pub fn epic_prompt(summary: &str, description: &str, issue_key: &str) -> String {
    let mut prompt = format!(
        "You are tasked with breaking down the following epic into user stories:\n\n\
         Epic Summary: `{summary}`\n\
         Epic Description: `{description}`\n\
         Epic Issue Key: `{issue_key}`\n\n\
         Take time to understand the existing codebase:\n\
         1. Explore the directory structure\n\
         2. For any files that seem relevant to this epic, read and understand them\n\
         3. Look for related functionality, patterns, and conventions used in the project\n\n\
         Now, generate a list of user stories that would be needed to implement this epic. For each user story:\n\
         1. Create a title in the format: 'As <role> I should (not) be able to <action> on <subject>' or similar\n\
         2. Write a detailed description that references specific code files and components that would need to be modified\n\
         3. Ensure each user story is focused, implementable, and testable\n\n\
         Your response should include:\n\
         1. A brief overview of the epic and how you understand it\n\
         2. A list of user stories with titles and descriptions\n\
         3. Any dependencies between user stories\n\n\
         IMPORTANT: At the end of your response, include a JSON array of the user stories in the following format:\n"
    );
    prompt.push_str(STORY_FORMAT_EXAMPLE);
    prompt.push_str(
        "Make sure the JSON is valid and properly formatted. Each user story must have a \
         unique 'id' field (format: 'US-n' where n is a number). If a story depends on \
         another story, include the 'depends_on' field with the id of the dependency. If \
         there's no dependency, set 'depends_on' to null.\n\n\
         IMPORTANT: Do not use any markdown styling (such as bold, italic, headers, bullet points) in your responses as they will be posted in Jira comments. Use plain text only.",
    );
    prompt
}
