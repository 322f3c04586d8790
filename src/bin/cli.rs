use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use warifuri::engine::{
    discover_all_projects, discover_all_projects_safe, find_ready_tasks, find_task_by_name,
    write_done_file, ExecutionConfig, TaskExecutor, TaskGraph,
};
use warifuri::github;
use warifuri::template::expand_template_directory;
use warifuri::workspace::{find_workspace_root, Project, Task, TaskStatus, PROJECTS_DIR};

#[derive(Parser)]
#[command(name = "warifuri")]
#[command(about = "Workspace-oriented task orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace directory (default: discovered from the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level filter (overrides WARIFURI_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List tasks in the workspace
    List {
        /// Show only ready tasks
        #[arg(long)]
        ready: bool,

        /// Show only completed tasks
        #[arg(long)]
        completed: bool,

        /// Filter by project name
        #[arg(long)]
        project: Option<String>,

        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,

        /// Comma-separated list of fields to display
        #[arg(long)]
        fields: Option<String>,
    },

    /// Run a task (or the first ready task)
    Run {
        /// Task to run: PROJECT or PROJECT/TASK
        #[arg(long)]
        task: Option<String>,

        /// Show what would be executed without executing
        #[arg(long)]
        dry_run: bool,

        /// Execute even when dependencies or inputs are unsatisfied
        #[arg(long)]
        force: bool,
    },

    /// Show details of a single task
    Show {
        /// PROJECT/TASK
        task: String,
    },

    /// Validate workspace structure and dependencies
    Validate,

    /// Render the dependency graph
    Graph {
        #[arg(long, value_enum, default_value = "ascii")]
        format: GraphFormat,

        /// Filter by project name
        #[arg(long)]
        project: Option<String>,
    },

    /// Mark a task as done without executing it
    #[command(name = "mark-done")]
    MarkDone {
        /// PROJECT/TASK
        task: String,

        /// Message recorded in done.md
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Scaffold a new project or task
    Init {
        /// PROJECT or PROJECT/TASK
        name: String,
    },

    /// Work with workspace templates
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Create a GitHub issue for a task or a project
    Issue {
        /// Child issue for a specific task (PROJECT/TASK)
        #[arg(long)]
        task: Option<String>,

        /// Parent issue rolling up a project's tasks
        #[arg(long)]
        project: Option<String>,

        /// Labels to attach (repeatable)
        #[arg(long)]
        label: Vec<String>,

        /// Preview the issue without creating it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List available templates
    List,

    /// Expand a template into a new project
    Expand {
        /// Template name under templates/
        template: String,

        /// Target project name
        project: String,

        /// Template variables as KEY=VALUE (repeatable)
        #[arg(short, long)]
        var: Vec<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
    Tsv,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GraphFormat {
    Ascii,
    Mermaid,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let fallback = std::env::var("WARIFURI_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = match &cli.workspace {
        Some(path) => path.clone(),
        None => find_workspace_root(None).context(
            "could not find workspace directory; run from a directory containing 'projects/' or 'workspace/'",
        )?,
    };

    match cli.command {
        Commands::List {
            ready,
            completed,
            project,
            format,
            fields,
        } => cmd_list(&workspace, ready, completed, project, format, fields),
        Commands::Run {
            task,
            dry_run,
            force,
        } => cmd_run(&workspace, task, dry_run, force).await,
        Commands::Show { task } => cmd_show(&workspace, &task),
        Commands::Validate => cmd_validate(&workspace),
        Commands::Graph { format, project } => cmd_graph(&workspace, format, project),
        Commands::MarkDone { task, message } => {
            cmd_mark_done(&workspace, &task, message.as_deref()).await
        }
        Commands::Init { name } => cmd_init(&workspace, &name),
        Commands::Template { command } => cmd_template(&workspace, command),
        Commands::Issue {
            task,
            project,
            label,
            dry_run,
        } => cmd_issue(&workspace, task.as_deref(), project.as_deref(), &label, dry_run).await,
    }
}

fn split_full_name(full_name: &str) -> anyhow::Result<(&str, &str)> {
    full_name
        .split_once('/')
        .with_context(|| format!("expected PROJECT/TASK, got '{}'", full_name))
}

fn discover_with_statuses(workspace: &std::path::Path) -> (Vec<Project>, Vec<Task>) {
    let (mut projects, errors) = discover_all_projects_safe(workspace);
    for err in &errors {
        tracing::warn!(error = %err, "discovery issue");
    }
    let ready = find_ready_tasks(&mut projects, workspace);
    (projects, ready)
}

fn cmd_list(
    workspace: &std::path::Path,
    ready: bool,
    completed: bool,
    project: Option<String>,
    format: OutputFormat,
    fields: Option<String>,
) -> anyhow::Result<()> {
    let (projects, _) = discover_with_statuses(workspace);

    let tasks: Vec<&Task> = projects
        .iter()
        .filter(|p| project.as_deref().map(|name| p.name == name).unwrap_or(true))
        .flat_map(|p| p.tasks.iter())
        .filter(|t| {
            if ready {
                t.status == TaskStatus::Ready
            } else if completed {
                t.status == TaskStatus::Completed
            } else {
                true
            }
        })
        .collect();

    match format {
        OutputFormat::Json => {
            let data: Vec<serde_json::Value> =
                tasks.iter().map(|t| task_fields(t, fields.as_deref())).collect();
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        OutputFormat::Tsv => {
            if let Some(first) = tasks.first() {
                let headers: Vec<String> = match task_fields(first, fields.as_deref()) {
                    serde_json::Value::Object(map) => map.keys().cloned().collect(),
                    _ => vec![],
                };
                println!("{}", headers.join("\t"));
                for task in &tasks {
                    let record = task_fields(task, fields.as_deref());
                    let row: Vec<String> = headers
                        .iter()
                        .map(|h| match &record[h] {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    println!("{}", row.join("\t"));
                }
            }
        }
        OutputFormat::Plain => {
            if tasks.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }
            for task in &tasks {
                println!("[{}] {}", task.status.as_str().to_uppercase(), task.full_name());
                println!("  {}", task.instruction.description);
                println!();
            }
        }
    }
    Ok(())
}

fn task_fields(task: &Task, fields: Option<&str>) -> serde_json::Value {
    let all = serde_json::json!({
        "name": task.full_name(),
        "description": task.instruction.description,
        "status": task.status.as_str(),
        "type": task.task_type.as_str(),
        "dependencies": task.instruction.dependencies,
        "project": task.project,
        "task": task.name,
    });

    let selected: Vec<&str> = match fields {
        Some(fields) => fields.split(',').map(str::trim).collect(),
        None => vec!["name", "description", "status"],
    };

    let mut map = serde_json::Map::new();
    if let serde_json::Value::Object(all) = all {
        for field in selected {
            if let Some(value) = all.get(field) {
                map.insert(field.to_string(), value.clone());
            }
        }
    }
    serde_json::Value::Object(map)
}

async fn cmd_run(
    workspace: &std::path::Path,
    task: Option<String>,
    dry_run: bool,
    force: bool,
) -> anyhow::Result<()> {
    let mut projects = discover_all_projects(workspace)?;
    if projects.is_empty() {
        println!("No projects found in workspace.");
        return Ok(());
    }

    let ready = find_ready_tasks(&mut projects, workspace);

    let target: Task = match task.as_deref() {
        Some(spec) if spec.contains('/') => {
            let (project_name, task_name) = split_full_name(spec)?;
            let found = find_task_by_name(&projects, project_name, task_name)
                .with_context(|| format!("Task '{}' not found", spec))?;
            if !force
                && found.status != TaskStatus::Ready
                && found.status != TaskStatus::Completed
            {
                bail!(
                    "Task '{}' is not ready (dependencies or inputs unsatisfied); use --force to run anyway",
                    spec
                );
            }
            found.clone()
        }
        Some(project_name) => {
            match ready.iter().find(|t| t.project == project_name) {
                Some(found) => found.clone(),
                None => {
                    println!("No ready tasks found in project '{}'.", project_name);
                    return Ok(());
                }
            }
        }
        None => match ready.first() {
            Some(found) => found.clone(),
            None => {
                println!("No ready tasks found.");
                return Ok(());
            }
        },
    };

    println!("Executing task: {}", target.full_name());
    println!("Type: {}", target.task_type);
    println!("Description: {}", target.instruction.description);

    let config = ExecutionConfig {
        dry_run,
        force,
        ..ExecutionConfig::default()
    };
    let executor = TaskExecutor::with_config(workspace, config);

    match executor.execute(&target).await {
        Ok(()) => {
            if dry_run {
                println!("[DRY RUN] Task execution simulation completed.");
            } else {
                println!("✅ Task completed: {}", target.full_name());
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ Task failed: {}", target.full_name());
            Err(err.into())
        }
    }
}

fn cmd_show(workspace: &std::path::Path, spec: &str) -> anyhow::Result<()> {
    let (project_name, task_name) = split_full_name(spec)?;
    let (projects, _) = discover_with_statuses(workspace);
    let task = find_task_by_name(&projects, project_name, task_name)
        .with_context(|| format!("Task '{}' not found", spec))?;

    println!("Task: {}", task.full_name());
    println!("Type: {}", task.task_type);
    println!("Status: {}", task.status);
    println!("Description: {}", task.instruction.description);
    println!("Path: {}", task.path.display());
    if !task.instruction.dependencies.is_empty() {
        println!("Dependencies: {}", task.instruction.dependencies.join(", "));
    }
    if !task.instruction.inputs.is_empty() {
        println!("Inputs: {}", task.instruction.inputs.join(", "));
    }
    if !task.instruction.outputs.is_empty() {
        println!("Outputs: {}", task.instruction.outputs.join(", "));
    }
    if let Some(note) = &task.instruction.note {
        println!("Note: {}", note);
    }
    Ok(())
}

fn cmd_validate(workspace: &std::path::Path) -> anyhow::Result<()> {
    let (projects, errors) = discover_all_projects_safe(workspace);

    let all_tasks: Vec<Task> = projects
        .iter()
        .flat_map(|p| p.tasks.iter().cloned())
        .collect();
    let graph = TaskGraph::build(&all_tasks);

    for (task, dependency) in graph.unresolved_references() {
        println!("⚠️  {} depends on unknown task '{}'", task, dependency);
    }

    if !errors.is_empty() {
        for err in &errors {
            eprintln!("❌ {}", err);
        }
        bail!("validation failed with {} error(s)", errors.len());
    }

    println!(
        "✅ Workspace valid: {} project(s), {} task(s).",
        projects.len(),
        all_tasks.len()
    );
    Ok(())
}

fn cmd_graph(
    workspace: &std::path::Path,
    format: GraphFormat,
    project: Option<String>,
) -> anyhow::Result<()> {
    let (projects, _) = discover_with_statuses(workspace);

    let tasks: Vec<&Task> = projects
        .iter()
        .filter(|p| project.as_deref().map(|name| p.name == name).unwrap_or(true))
        .flat_map(|p| p.tasks.iter())
        .collect();

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    match format {
        GraphFormat::Mermaid => {
            println!("```mermaid");
            println!("graph TD");
            for task in &tasks {
                let node = task.full_name().replace(['/', '-'], "_");
                println!("    {}[\"{} {}\"]", node, status_symbol(task), task.full_name());
            }
            for task in &tasks {
                let node = task.full_name().replace(['/', '-'], "_");
                for dep in &task.instruction.dependencies {
                    let dep_full =
                        warifuri::engine::resolve_dependency(dep, &task.project);
                    let dep_node = dep_full.replace(['/', '-'], "_");
                    println!("    {} --> {}", dep_node, node);
                }
            }
            println!("```");
        }
        GraphFormat::Ascii => {
            println!("Dependency graph:");
            println!();
            for task in &tasks {
                println!("{} {}", status_symbol(task), task.full_name());
                if task.instruction.dependencies.is_empty() {
                    println!("  └── no dependencies");
                } else {
                    for dep in &task.instruction.dependencies {
                        println!("  └── depends on: {}", dep);
                    }
                }
                println!();
            }
        }
    }
    Ok(())
}

fn status_symbol(task: &Task) -> &'static str {
    match task.status {
        TaskStatus::Completed => "✅",
        TaskStatus::Ready => "🔄",
        TaskStatus::Pending => "⏸️",
    }
}

async fn cmd_mark_done(
    workspace: &std::path::Path,
    spec: &str,
    message: Option<&str>,
) -> anyhow::Result<()> {
    let (project_name, task_name) = split_full_name(spec)?;
    let projects = discover_all_projects(workspace)?;
    let task = find_task_by_name(&projects, project_name, task_name)
        .with_context(|| format!("Task '{}' not found", spec))?;

    write_done_file(task, workspace, Some(message.unwrap_or("Manually marked as done"))).await?;
    println!("✅ Marked done: {}", task.full_name());
    Ok(())
}

fn cmd_init(workspace: &std::path::Path, name: &str) -> anyhow::Result<()> {
    let projects_base = workspace.join(PROJECTS_DIR);

    match name.split_once('/') {
        Some((project, task)) => {
            let task_dir = projects_base.join(project).join(task);
            if task_dir.join("instruction.yaml").exists() {
                bail!("Task '{}' already exists", name);
            }
            std::fs::create_dir_all(&task_dir)?;
            let instruction = format!(
                "name: {}\ndescription: TODO describe this task\ndependencies: []\ninputs: []\noutputs: []\n",
                task
            );
            warifuri::fsops::atomic_write(&task_dir.join("instruction.yaml"), &instruction)?;
            println!("Created task: {}", task_dir.display());
        }
        None => {
            let project_dir = projects_base.join(name);
            if project_dir.exists() {
                bail!("Project '{}' already exists", name);
            }
            std::fs::create_dir_all(&project_dir)?;
            println!("Created project: {}", project_dir.display());
        }
    }
    Ok(())
}

fn cmd_template(workspace: &std::path::Path, command: TemplateCommands) -> anyhow::Result<()> {
    let templates_dir = workspace.join("templates");

    match command {
        TemplateCommands::List => {
            let mut names: Vec<String> = match std::fs::read_dir(&templates_dir) {
                Ok(entries) => entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().to_str().map(String::from))
                    .collect(),
                Err(_) => vec![],
            };
            names.sort();
            if names.is_empty() {
                println!("No templates found.");
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
            Ok(())
        }
        TemplateCommands::Expand {
            template,
            project,
            var,
        } => {
            let mut variables: HashMap<String, String> = HashMap::new();
            variables.insert("PROJECT_NAME".to_string(), project.clone());
            for pair in &var {
                let (key, value) = pair
                    .split_once('=')
                    .with_context(|| format!("expected KEY=VALUE, got '{}'", pair))?;
                variables.insert(key.to_string(), value.to_string());
            }

            let source = templates_dir.join(&template);
            let target = workspace.join(PROJECTS_DIR).join(&project);
            if target.exists() {
                bail!("Project '{}' already exists", project);
            }

            expand_template_directory(&source, &target, &variables, None)?;
            println!("Expanded template '{}' into {}", template, target.display());
            Ok(())
        }
    }
}

async fn cmd_issue(
    workspace: &std::path::Path,
    task: Option<&str>,
    project: Option<&str>,
    labels: &[String],
    dry_run: bool,
) -> anyhow::Result<()> {
    let (projects, _) = discover_with_statuses(workspace);

    match (task, project) {
        (Some(spec), None) => {
            let (project_name, task_name) = split_full_name(spec)?;
            let target = find_task_by_name(&projects, project_name, task_name)
                .with_context(|| format!("Task '{}' not found", spec))?;
            github::create_task_issue(target, labels, dry_run).await?;
        }
        (None, Some(name)) => {
            let target = projects
                .iter()
                .find(|p| p.name == name)
                .with_context(|| format!("Project '{}' not found", name))?;
            github::create_project_issue(target, labels, dry_run).await?;
        }
        _ => bail!("specify exactly one of --task or --project"),
    }
    Ok(())
}
