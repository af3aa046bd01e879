//! Scan a directory without calling a model
//!
//! Prints the key files picked by importance scoring and how much of the
//! token budget their contents use.
//!
//! Run with: cargo run --example scan -- ./some/project

use repo_brief::{AnalyzerConfig, scan};

fn main() -> anyhow::Result<()> {
    let root = std::env::args().nth(1).unwrap_or_else(|| ".".to_string());

    // A tighter budget than the default
    let config = AnalyzerConfig::builder()
        .max_key_files(10)
        .token_budget(4_000)
        .build()?;

    let plan = scan(&root, &config)?;

    println!(
        "Project tree ({} files, {} ignored):",
        plan.tree.total_files, plan.tree.ignored_files
    );
    print!("{}", plan.tree.structure.render());
    println!();

    println!("Key files:");
    for file in &plan.key_files {
        println!("  {:>6.1}  {}", file.importance_score, file.path);
    }

    let budget = &plan.context.budget;
    println!(
        "\n✓ {} of {} entries kept, {} tokens used",
        plan.context.entries.len(),
        plan.key_files.len(),
        budget.total_tokens_used
    );
    if let Some(path) = &plan.context.truncated_path {
        println!("  Budget ran out at {path}");
    }

    Ok(())
}
