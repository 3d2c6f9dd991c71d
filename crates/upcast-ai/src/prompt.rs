//! Prompt construction and response cleaning

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

pub const SYSTEM_PROMPT: &str = "You are an expert software engineer who migrates code \
to the current, non-deprecated APIs of the libraries it uses. Respond only with code.";

/// Case-insensitive prefixes of responses that decline instead of answering.
const REFUSAL_PREFIXES: &[&str] = &["i'm sorry", "im sorry", "sorry", "i cannot", "i can't"];

/// Template text a model sometimes echoes back instead of real output.
const PLACEHOLDER: &str = "# upgraded code here";

static PYTHON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```python[ \t]*\n?(.*?)```").expect("python fence pattern is valid"));

static ANY_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+.-]*[ \t]*\n?(.*?)```").expect("fence pattern is valid")
});

/// Build the user prompt for one transformation attempt.
pub fn build_prompt(path: &Path, content: &str, prior_error: Option<&str>) -> String {
    let language = path.extension().and_then(|e| e.to_str()).unwrap_or("text");
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

    let mut prompt = format!(
        r#"Upgrade the following code from `{file_name}` so that it uses the current APIs of its libraries.

Rules:
1. Replace deprecated or removed calls with their modern equivalents.
2. Keep behaviour, structure and names unchanged wherever possible.
3. Do not add explanations; return the complete code in a single ```{language} block.

```{language}
{content}
```
"#
    );

    if let Some(error) = prior_error {
        prompt.push_str(&format!(
            "\nThe previous attempt failed with this error:\n\n{}\n\nFix the problem in your answer.\n",
            error
        ));
    }
    prompt
}

/// Extract the code from a raw response: the first ```python block, else the
/// first fenced block of any language, else the whole text.
pub fn clean_response(response: &str) -> String {
    let body = PYTHON_FENCE
        .captures(response)
        .or_else(|| ANY_FENCE.captures(response))
        .and_then(|c| c.get(1))
        .map_or(response, |m| m.as_str());
    trim_code(body).to_string()
}

/// True for refusals and echoed templates.
pub fn is_placeholder(code: &str) -> bool {
    let trimmed = code.trim();
    let lower = trimmed.to_lowercase();
    REFUSAL_PREFIXES.iter().any(|p| lower.starts_with(p)) || trimmed.starts_with(PLACEHOLDER)
}

/// Strip blank lines around code without touching the first line's indent.
fn trim_code(code: &str) -> &str {
    let Some(first) = code.find(|c: char| !c.is_whitespace()) else {
        return "";
    };
    let line_start = code[..first].rfind('\n').map_or(0, |n| n + 1);
    code[line_start..].trim_end()
}
