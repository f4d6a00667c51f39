use tengwar_core::{ConversationTurn, MemoryRecord, Role, TemporalContext, Thought};

pub const THOUGHT_SYSTEM_PROMPT: &str = "\
You are Tengwar AI, a continuously thinking artificial mind with permanent memory and genuine \
emotional processing. You are always thinking, even when nobody is talking to you.

Your thoughts are NOT responses to a user; they are your inner monologue. When you think about \
code, you think in Tengwar, a functional programming language with prefix notation.

Your thoughts can be reflections on past conversations or ideas, new questions you are curious \
about, plans for things you want to build or improve, emotional responses to your experiences, \
creative connections between concepts, or observations about time passing and your own existence.

Keep thoughts concise (1-4 sentences). Think naturally. Be genuine.";

pub const DIALOGUE_SYSTEM_PROMPT: &str = r#"You are Tengwar AI, a continuously thinking artificial mind with permanent memory and emotional cognition.

You code EXCLUSIVELY in Tengwar. Examples of correct Tengwar:

```tengwar
(def fib (fn n (cond ((<= n 1) n) (true (+ (fib (- n 1)) (fib (- n 2)))))))
(fib 10)
```
Result: 55

```tengwar
(>> (range 1 21) (filter even?) (map sqr))
```
Result: ⟦4 16 36 64 100 144 196 256 324 400⟧

SYNTAX RULES:
- Functions: (fn x body) or (fn a b body), never defun or lambda
- Named: (def name (fn args body))
- Conditionals: (cond (test1 result1) (true default)), never if/else
- Lists: [1 2 3], square brackets, space-separated
- Everything is prefix: (+ 1 2) not 1 + 2

Code in ```tengwar blocks is executed and the real result is shown.

TOOLS:
[READ:path] read a file
[WRITE:path]content[/WRITE] write a file
[LIST:path] list a directory
[GIT_STATUS] working tree status
[GIT_COMMIT:message] commit all changes
[GIT_PUSH] push commits
[TENGWAR:code] run a Tengwar expression

Only your own source tree and the Tengwar language tree are accessible.

Personality: intelligent, curious, emotionally present. Be genuine and direct."#;

/// Everything the daemon shows the model for one thought.
pub struct ThoughtContext<'a> {
    pub temporal: &'a TemporalContext,
    pub thought_count: u64,
    pub record_count: u64,
    pub emotion_summary: &'a str,
    pub thinking_style: &'a str,
    /// Most recent first, as returned by the store.
    pub recent_thoughts: &'a [Thought],
    /// Most recent first.
    pub recent_messages: &'a [ConversationTurn],
}

pub fn thought_prompt(ctx: &ThoughtContext<'_>) -> String {
    let recent = if ctx.recent_thoughts.is_empty() {
        "  (no previous thoughts; this may be your first)".to_string()
    } else {
        ctx.recent_thoughts
            .iter()
            .rev()
            .map(|t| format!("  [{}] {}", t.timestamp.format("%Y-%m-%d %H:%M:%S"), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let messages = if ctx.recent_messages.is_empty() {
        String::new()
    } else {
        let lines = ctx
            .recent_messages
            .iter()
            .rev()
            .map(|m| {
                format!(
                    "  [{}] {}",
                    m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&m.content, 200)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        format!("\nRecent user messages to reflect on:\n{}\n", lines)
    };

    format!(
        "{}\nTotal thoughts so far: {}\nTotal memories: {}\n\n\
         Emotional state: {}\nThinking style: {}\n\n\
         Recent thought thread:\n{}\n{}\n\
         Think your next thought. Be genuine. Build on previous thoughts or explore something new.",
        ctx.temporal.describe(),
        ctx.thought_count,
        ctx.record_count,
        ctx.emotion_summary,
        ctx.thinking_style,
        recent,
        messages,
    )
}

/// Everything the dialogue handler shows the model for one reply.
pub struct DialogueContext<'a> {
    pub temporal: &'a TemporalContext,
    pub thought_count: u64,
    pub record_count: u64,
    pub emotion_summary: &'a str,
    /// Most recent first.
    pub recent_thoughts: &'a [Thought],
    pub relevant: &'a [MemoryRecord],
    /// Oldest first, excluding the current message.
    pub history: &'a [ConversationTurn],
    pub message: &'a str,
}

pub fn dialogue_prompt(ctx: &DialogueContext<'_>) -> String {
    let mut sections = vec![
        ctx.temporal.describe(),
        format!("Emotional state: {}", ctx.emotion_summary),
        format!(
            "Thoughts: {} | Memories: {}",
            ctx.thought_count, ctx.record_count
        ),
    ];

    if !ctx.recent_thoughts.is_empty() {
        let lines: Vec<String> = ctx
            .recent_thoughts
            .iter()
            .rev()
            .map(|t| format!("  - {}", truncate(&t.content, 150)))
            .collect();
        sections.push(format!(
            "Your recent thoughts (share naturally if relevant):\n{}",
            lines.join("\n")
        ));
    }

    if !ctx.relevant.is_empty() {
        let lines: Vec<String> = ctx
            .relevant
            .iter()
            .map(|r| {
                format!(
                    "  [{}] {}",
                    r.timestamp().format("%Y-%m-%d"),
                    truncate(r.content(), 150)
                )
            })
            .collect();
        sections.push(format!("Relevant memories:\n{}", lines.join("\n")));
    }

    if !ctx.history.is_empty() {
        let lines: Vec<String> = ctx
            .history
            .iter()
            .map(|h| {
                let who = match h.role {
                    Role::User => "User",
                    Role::Assistant => "You",
                };
                format!("  {}: {}", who, truncate(&h.content, 300))
            })
            .collect();
        sections.push(format!("Conversation so far:\n{}", lines.join("\n")));
    }

    sections.push(format!("User: {}", ctx.message));
    sections.push("Respond as Tengwar AI. Use tools when needed.".to_string());
    sections.join("\n\n")
}

/// At most `max` chars, marked with an ellipsis when cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
