use std::path::Path;

use anyhow::{Context, Result};
use client_core::FormController;
use serde::Deserialize;

/// An activity written as TOML for the `submit` command. Every field is
/// optional so the same file can patch a draft being edited.
#[derive(Debug, Default, Deserialize)]
pub struct DraftFile {
    #[serde(default)]
    pub title: Option<String>,
    /// Rich text; markup is stripped before sending.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub main_criterion: Option<String>,
    #[serde(default)]
    pub sub_criterion: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

#[derive(Debug, Deserialize)]
pub struct TableSpec {
    #[serde(default)]
    pub title: Option<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSpec {
    pub fn cols(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl DraftFile {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid draft file")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        Self::parse(&raw).with_context(|| format!("in '{}'", path.display()))
    }

    /// Copies the fields present in the file into the form. Tables are
    /// appended through the form's table builder.
    pub async fn apply(&self, form: &mut FormController) -> Result<()> {
        if let Some(title) = &self.title {
            form.set_title(title);
        }
        if let Some(description) = &self.description {
            form.set_description_html(description);
        }
        if let Some(main) = &self.main_criterion {
            form.on_main_criterion_changed(main).await;
        }
        if let Some(sub) = &self.sub_criterion {
            form.set_sub_criterion(sub);
        }
        if let Some(author) = &self.author {
            form.set_author_display_name(author);
        }

        for spec in &self.tables {
            form.open_table(None)?;
            let builder = form.table_builder();
            builder.resize(spec.rows.len(), spec.cols());
            builder.set_title(spec.title.clone());
            for (row, cells) in spec.rows.iter().enumerate() {
                for (col, cell) in cells.iter().enumerate() {
                    builder
                        .set_cell(row, col, cell.as_str())
                        .with_context(|| format!("table cell ({row}, {col}) does not fit"))?;
                }
            }
            form.save_table().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/draft_file_tests.rs"]
mod tests;
