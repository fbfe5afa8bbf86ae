//! Export and import commands - move a whole database through a JSON snapshot.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tracing::info;

use cmdb_core::{AuthorizationContext, ImportResult, MigrationEngine, Snapshot};

use super::open_database;
use crate::config::AppConfig;

/// Writes a snapshot of the database to `output`, or to stdout.
pub async fn export_snapshot(config: &AppConfig, output: Option<&Path>) -> Result<()> {
    let pool = open_database(&config.database.url, config).await?;
    let snapshot = MigrationEngine::new(&pool)
        .export(&AuthorizationContext::system())
        .await
        .context("Export failed")?;
    let body = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(path) => {
            std::fs::write(path, &body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = body.len(), "Snapshot exported");
            eprintln!(
                "{} Exported {} assets, {} tags, {} cloud accounts to {}",
                "✓".green(),
                snapshot.data.assets.len(),
                snapshot.data.tags.len(),
                snapshot.data.cloud_accounts.len(),
                path.display()
            );
        }
        None => println!("{}", body),
    }

    pool.close().await;
    Ok(())
}

/// Replays a snapshot file into the database.
pub async fn import_snapshot(config: &AppConfig, file: &Path) -> Result<ImportResult> {
    let bytes =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let snapshot = Snapshot::from_json(&bytes)
        .with_context(|| format!("{} is not a valid snapshot", file.display()))?;

    let pool = open_database(&config.database.url, config).await?;
    let result = MigrationEngine::new(&pool)
        .import(&AuthorizationContext::system(), &snapshot)
        .await
        .context("Import failed")?;
    pool.close().await;

    print_import_result(&result);
    Ok(result)
}

fn print_import_result(result: &ImportResult) {
    println!("{}", result.message.bold());
    println!("─────────────────────");
    println!(
        "  {:<16}{:>10}{:>10}",
        "", "imported".cyan(), "skipped".cyan()
    );
    let rows = [
        ("users", result.imported.users, result.skipped.users),
        ("tags", result.imported.tags, result.skipped.tags),
        ("assets", result.imported.assets, result.skipped.assets),
        (
            "credentials",
            result.imported.credentials,
            result.skipped.credentials,
        ),
        (
            "cloud accounts",
            result.imported.cloud_accounts,
            result.skipped.cloud_accounts,
        ),
    ];
    for (label, imported, skipped) in rows {
        println!("  {:<16}{:>10}{:>10}", label, imported, skipped);
    }

    if !result.errors.is_empty() {
        println!();
        println!("{} ({})", "Errors".red().bold(), result.errors.len());
        for error in &result.errors {
            println!("  {} {}: {}", error.entity, error.reference, error.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::temp_database;
    use cmdb_core::db::{create_tag_repository, TagRepository};
    use cmdb_core::TagInput;

    #[tokio::test]
    async fn test_export_then_import_into_fresh_database() {
        let (_src_dir, src_url, src_config) = temp_database();
        let pool = open_database(&src_url, &src_config).await.unwrap();
        create_tag_repository(&pool)
            .create(&TagInput::new("env", "prod"))
            .await
            .unwrap();
        pool.close().await;

        let out_dir = tempfile::tempdir().unwrap();
        let snapshot_path = out_dir.path().join("snapshot.json");
        export_snapshot(&src_config, Some(&snapshot_path))
            .await
            .unwrap();
        assert!(snapshot_path.is_file());

        let (_dst_dir, _, dst_config) = temp_database();
        let result = import_snapshot(&dst_config, &snapshot_path).await.unwrap();
        assert!(result.errors.is_empty());
        assert_eq!(result.imported.tags, 1);

        let again = import_snapshot(&dst_config, &snapshot_path).await.unwrap();
        assert_eq!(again.imported.tags, 0);
        assert_eq!(again.skipped.tags, 1);
    }

    #[tokio::test]
    async fn test_import_rejects_non_snapshot() {
        let (dir, _, config) = temp_database();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{\"hello\": 1}").unwrap();

        assert!(import_snapshot(&config, &path).await.is_err());
    }
}
