//! 导出进度
//!
//! 库只产出结构化事件，如何展示由调用方决定。
//! 附件进度按 10 个百分点的里程碑上报，而不是逐个文件。

use std::path::PathBuf;

/// 里程碑步长（百分点）
pub const MILESTONE_STEP: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    DatabaseDecrypted { path: PathBuf },
    AttachmentsFound { total: usize },
    AttachmentsProgress { done: usize, total: usize, percent: u8 },
    AttachmentsDecrypted { decrypted: usize, failed: usize },
    RemapStarted { known_names: usize },
    RemapFinished { remapped: usize, unmapped: usize, failed: usize },
}

/// 把已完成数量折算成百分比，跨过下一个里程碑时才返回
#[derive(Debug, Clone)]
pub struct Milestones {
    total: usize,
    last_reported: u8,
}

impl Milestones {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            last_reported: 0,
        }
    }

    pub fn advance(&mut self, done: usize) -> Option<u8> {
        if self.total == 0 {
            return None;
        }

        let percent = (done.min(self.total) * 100 / self.total) as u8;
        if percent.saturating_sub(self.last_reported) >= MILESTONE_STEP {
            self.last_reported = percent;
            Some(percent)
        } else {
            None
        }
    }
}
