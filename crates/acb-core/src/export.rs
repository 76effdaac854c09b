//! Text files sent as documents.

use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::{formatting::safe_file_name, messaging::types::ExportFile, Result};

/// Writes export files under one directory and names them for the chat.
#[derive(Clone, Debug)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn write(&self, file_name: &str, content: &str) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, content).await?;
        tracing::info!(path = %path.display(), bytes = content.len(), "export written");
        Ok(path)
    }

    async fn export(
        &self,
        stored_name: String,
        content: &str,
        file_name: String,
        caption: String,
    ) -> Result<ExportFile> {
        let path = self.write(&stored_name, content).await?;
        Ok(ExportFile {
            path,
            file_name,
            caption,
        })
    }

    /// `详细账单` of the live ledger.
    pub async fn detailed_bill(
        &self,
        title: &str,
        content: &str,
        now: NaiveDateTime,
    ) -> Result<ExportFile> {
        self.export(
            format!("{}_{}_bill.txt", safe_file_name(title), now.format("%Y%m%d%H%M%S")),
            content,
            format!("{title}_账单.txt"),
            format!("{title} 账单详情"),
        )
        .await
    }

    /// Detailed bill of an archived day.
    pub async fn history_bill(
        &self,
        title: &str,
        date: &str,
        content: &str,
        now: NaiveDateTime,
    ) -> Result<ExportFile> {
        self.export(
            format!(
                "{}_{date}_history_{}.txt",
                safe_file_name(title),
                now.format("%Y%m%d%H%M%S")
            ),
            content,
            format!("{title}_{date}_历史账单.txt"),
            format!("{title} {date} 历史账单详情"),
        )
        .await
    }

    pub async fn date_bill(
        &self,
        title: &str,
        date: &str,
        content: &str,
        now: NaiveDateTime,
    ) -> Result<ExportFile> {
        self.export(
            format!(
                "{}_{date}_{}.txt",
                safe_file_name(title),
                now.format("%Y%m%d%H%M%S")
            ),
            content,
            format!("{title}_{date}_账单.txt"),
            format!("{title} {date} 财务账单导出文件"),
        )
        .await
    }

    pub async fn seven_days(
        &self,
        title: &str,
        content: &str,
        now: NaiveDateTime,
    ) -> Result<ExportFile> {
        self.export(
            format!(
                "{}_7days_{}.txt",
                safe_file_name(title),
                now.format("%Y%m%d_%H%M%S")
            ),
            content,
            format!("{title}_7天账单.txt"),
            format!("{title} 最近7天财务账单导出文件"),
        )
        .await
    }

    pub async fn all_chats(&self, date: &str, content: &str, now: NaiveDateTime) -> Result<ExportFile> {
        self.export(
            format!("all_groups_{date}_{}.txt", now.format("%Y%m%d_%H%M%S")),
            content,
            format!("{date}_所有群组统计.txt"),
            format!("{date} 所有群组财务统计导出文件"),
        )
        .await
    }
}
