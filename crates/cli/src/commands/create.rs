//! `lllm create`: Scaffold a new project from a template.
//!
//! A template is either one of the built-in file sets or a folder on disk.
//! Placeholders in file names and text files are replaced with the project
//! name: `__project_name__` and `{{project_name}}` with the name as given,
//! `{{PROJECT_NAME}}` with it upper-cased.

use std::path::{Path, PathBuf};

use lllm_config::LllmConfig;

pub const DEFAULT_TEMPLATE: &str = "init_template";

const TEXT_EXTENSIONS: &[&str] = &["toml", "md", "txt", "json", "yaml", "yml", "cfg", "ini", "rs"];

const INIT_CONFIG: &str = r#"name = "{{project_name}}"
log_type = "localfile"
log_dir = "logs"
provider = "openai"
max_exception_retry = 3
max_interrupt_times = 5
max_llm_recall = 0

[prompts]
folders = ["prompts"]

[agents.assistant]
model_name = "gpt-4.1-mini"
system_prompt_path = "assistant/system"
temperature = 0.2
"#;

const INIT_PROMPTS: &str = r#"[[prompts]]
path = "system"
prompt = "You are the assistant of the {{project_name}} project. Answer precisely and say when you are unsure."

[[prompts]]
path = "task"
prompt = """User task: {task}

Think it through, then give your final answer inside <answer></answer> tags."""
xml_tags = ["answer"]
"#;

const INIT_README: &str = r#"# {{project_name}}

Prompts live in `prompts/`, one TOML file per namespace. Agents are declared in
`lllm.toml` under `[agents.<name>]`.

    export OPENAI_API_KEY=sk-...
    lllm prompts
    lllm ask assistant assistant/task --arg task="Summarize the plan"
    lllm replay <session>
"#;

/// Files of a built-in template, as (relative path, content).
fn builtin(template: &str) -> Option<Vec<(&'static str, String)>> {
    match template {
        "init_template" => Some(vec![
            ("lllm.toml", INIT_CONFIG.to_string()),
            ("prompts/assistant.toml", INIT_PROMPTS.to_string()),
            ("README.md", INIT_README.to_string()),
        ]),
        "minimal" => {
            let mut config = LllmConfig {
                name: "{{project_name}}".into(),
                ..LllmConfig::default()
            };
            config.prompts.folders.push(PathBuf::from("prompts"));
            let toml = config.to_toml().ok()?;
            Some(vec![("lllm.toml", toml), ("prompts/.gitkeep", String::new())])
        }
        _ => None,
    }
}

pub fn run(name: &str, template: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let target = create_project(&cwd, name, template)?;
    println!("Created project at {}", target.display());
    println!();
    println!("Next steps:");
    println!("  1. cd {name} and set OPENAI_API_KEY (or api_key in lllm.toml)");
    println!("  2. lllm prompts");
    println!("  3. lllm ask assistant assistant/task --arg task=\"...\"");
    Ok(())
}

/// Create `root/name` from `template`. Fails if the folder already exists.
pub fn create_project(root: &Path, name: &str, template: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let target = root.join(name);
    if target.exists() {
        return Err(format!("Path '{}' already exists.", target.display()).into());
    }
    let replacements = [
        ("__project_name__", name.to_string()),
        ("{{project_name}}", name.to_string()),
        ("{{PROJECT_NAME}}", name.to_uppercase()),
    ];

    if let Some(files) = builtin(template) {
        for (relative, content) in files {
            let path = target.join(substitute(relative, &replacements));
            write_file(&path, substitute(&content, &replacements).as_bytes())?;
        }
    } else {
        let source = Path::new(template);
        if !source.is_dir() {
            return Err(format!("Template '{template}' not found (built-in: init_template, minimal).").into());
        }
        copy_template(source, &target, &replacements)?;
    }

    tracing::debug!(target = %target.display(), template, "Project created");
    Ok(target)
}

fn copy_template(src: &Path, dst: &Path, replacements: &[(&str, String)]) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    let mut entries: Vec<_> = std::fs::read_dir(src)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let target = dst.join(substitute(&file_name, replacements));

        if path.is_dir() {
            copy_template(&path, &target, replacements)?;
        } else if is_text(&path) {
            let content = std::fs::read_to_string(&path)?;
            write_file(&target, substitute(&content, replacements).as_bytes())?;
        } else {
            std::fs::copy(&path, &target)?;
        }
    }
    Ok(())
}

fn is_text(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

fn substitute(text: &str, replacements: &[(&str, String)]) -> String {
    replacements
        .iter()
        .fold(text.to_string(), |acc, (placeholder, value)| acc.replace(placeholder, value))
}

fn write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}
