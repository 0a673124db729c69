use crate::config::Config;

pub const AUDIO_PRO_THRESHOLD_MS: u64 = 60_000;
pub const FORTUNE_PRO_THRESHOLD_MS: u64 = 180_000;
/// More images than this always go to the pro tier.
pub const AMULET_PRO_IMAGE_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    Receipt,
    Audio,
    Amulet,
    Fortune,
    Parse,
}

impl Task {
    pub const ALL: [Task; 5] = [
        Task::Receipt,
        Task::Audio,
        Task::Amulet,
        Task::Fortune,
        Task::Parse,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Task::Receipt => "receipt",
            Task::Audio => "audio",
            Task::Amulet => "amulet",
            Task::Fortune => "fortune",
            Task::Parse => "parse",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskContext {
    pub duration_ms: u64,
    pub has_description: bool,
    pub image_count: usize,
}

impl TaskContext {
    pub fn duration(duration_ms: u64) -> Self {
        TaskContext {
            duration_ms,
            ..TaskContext::default()
        }
    }

    pub fn amulet(image_count: usize, description: &str) -> Self {
        TaskContext {
            duration_ms: 0,
            has_description: !description.trim().is_empty(),
            image_count,
        }
    }
}

/// Model identifiers per task plus the shared high-capability tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTiers {
    pub pro: String,
    pub receipt: String,
    pub audio: String,
    pub amulet: String,
    pub fortune: String,
    pub parse: String,
}

impl Default for ModelTiers {
    fn default() -> Self {
        let flash = "gemini-2.5-flash".to_string();
        ModelTiers {
            pro: "gemini-2.5-pro".to_string(),
            receipt: flash.clone(),
            audio: flash.clone(),
            amulet: flash.clone(),
            fortune: flash.clone(),
            parse: flash,
        }
    }
}

impl ModelTiers {
    pub fn from_config(config: &Config) -> Self {
        ModelTiers {
            pro: config.gemini_pro_model.clone(),
            receipt: config.gemini_model_receipt.clone(),
            audio: config.gemini_model_audio.clone(),
            amulet: config.gemini_model_amulet.clone(),
            fortune: config.gemini_model_fortune.clone(),
            parse: config.gemini_model_parse.clone(),
        }
    }

    fn default_for(&self, task: Task) -> &str {
        match task {
            Task::Receipt => &self.receipt,
            Task::Audio => &self.audio,
            Task::Amulet => &self.amulet,
            Task::Fortune => &self.fortune,
            Task::Parse => &self.parse,
        }
    }
}

fn wants_pro_tier(task: Task, context: &TaskContext) -> bool {
    match task {
        Task::Audio => context.duration_ms > AUDIO_PRO_THRESHOLD_MS,
        Task::Fortune => context.duration_ms > FORTUNE_PRO_THRESHOLD_MS,
        Task::Amulet => {
            context.image_count > AMULET_PRO_IMAGE_COUNT || !context.has_description
        }
        Task::Receipt | Task::Parse => false,
    }
}

pub fn select_model<'a>(task: Task, context: &TaskContext, tiers: &'a ModelTiers) -> &'a str {
    if wants_pro_tier(task, context) {
        &tiers.pro
    } else {
        tiers.default_for(task)
    }
}
