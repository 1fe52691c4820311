//! 各 AI 功能的提示词与采样参数

use std::sync::LazyLock;

use regex::Regex;

use super::client::{ChatMessage, CompletionRequest};

const TEMPERATURE: f32 = 0.6;
const MAX_TAGS: usize = 8;

static SCORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d*\.?\d+").expect("valid score regex"));

fn request(system: &str, user: String, max_tokens: u32) -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
        max_tokens,
        temperature: Some(TEMPERATURE),
        presence_penalty: None,
        frequency_penalty: None,
    }
}

// ---------- 聊天 ----------

pub fn chat(message: &str, note_title: &str, note_content: &str) -> CompletionRequest {
    let mut system = String::from(
        "你是一个智能的写作助手，专门帮助用户改进和完善他们的笔记内容。你的任务是：\n\n\
         1. 提供有用的写作建议和改进意见\n\
         2. 帮助用户组织和结构化内容\n\
         3. 纠正语法和拼写错误\n\
         4. 提供相关的信息和扩展内容\n\
         5. 回答用户关于笔记内容的问题\n\n\
         请用中文回复，保持友好和专业的语调。",
    );
    if !note_title.is_empty() {
        system.push_str(&format!("\n\n当前笔记标题：{}", note_title));
    }
    if !note_content.is_empty() {
        system.push_str(&format!("\n\n当前笔记内容：\n{}", note_content));
    }
    CompletionRequest {
        messages: vec![ChatMessage::system(system), ChatMessage::user(message)],
        max_tokens: 1000,
        temperature: Some(TEMPERATURE),
        presence_penalty: Some(0.1),
        frequency_penalty: Some(0.1),
    }
}

// ---------- 改进 ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImproveKind {
    Grammar,
    Clarity,
    Style,
    Structure,
    General,
}

impl ImproveKind {
    /// 未知类型按 general 处理
    pub fn parse(value: &str) -> Self {
        match value {
            "grammar" => Self::Grammar,
            "clarity" => Self::Clarity,
            "style" => Self::Style,
            "structure" => Self::Structure,
            _ => Self::General,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::Grammar => "请检查并纠正以下文本的语法、拼写和标点符号错误：",
            Self::Clarity => "请改进以下文本，使其更加清晰易懂：",
            Self::Style => "请改进以下文本的写作风格，使其更加优雅和专业：",
            Self::Structure => "请重新组织以下文本的结构，使其更有逻辑性：",
            Self::General => "请全面改进以下文本，包括语法、清晰度、风格和结构：",
        }
    }
}

pub fn improve(text: &str, kind: ImproveKind) -> CompletionRequest {
    request(
        "你是一个专业的文本编辑助手，专门帮助用户改进文本质量。",
        format!(
            "{}\n\n{}\n\n请直接返回改进后的文本，不需要额外的解释。",
            kind.instruction(),
            text
        ),
        1500,
    )
}

// ---------- 润色 ----------

pub fn polish(text: &str) -> CompletionRequest {
    request(
        "你是一个专业的文本润色专家，擅长改善文本的表达质量和可读性。",
        format!(
            "请对以下文本进行润色，使其更加流畅、优雅和易读。保持原意不变，但改善表达方式、语法和用词：\n\n{}\n\n请直接返回润色后的文本，不需要额外的解释。",
            text
        ),
        1500,
    )
}

// ---------- 改写 ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStyle {
    Formal,
    Casual,
    Academic,
    Creative,
    Concise,
    Detailed,
}

impl RewriteStyle {
    /// 未知风格按 formal 处理
    pub fn parse(value: &str) -> Self {
        match value {
            "casual" => Self::Casual,
            "academic" => Self::Academic,
            "creative" => Self::Creative,
            "concise" => Self::Concise,
            "detailed" => Self::Detailed,
            _ => Self::Formal,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::Formal => "请将以下文本改写为正式、专业的风格：",
            Self::Casual => "请将以下文本改写为轻松、口语化的风格：",
            Self::Academic => "请将以下文本改写为学术、严谨的风格：",
            Self::Creative => "请将以下文本改写为富有创意、生动的风格：",
            Self::Concise => "请将以下文本改写为简洁、精炼的风格：",
            Self::Detailed => "请将以下文本改写为详细、丰富的风格：",
        }
    }
}

pub fn rewrite(text: &str, style: RewriteStyle) -> CompletionRequest {
    request(
        "你是一个专业的文本改写专家，能够根据不同风格要求重新表达文本内容。",
        format!(
            "{}\n\n{}\n\n请保持原文的核心意思，但用不同的表达方式重新组织语言。直接返回改写后的文本，不需要额外的解释。",
            style.instruction(),
            text
        ),
        1500,
    )
}

// ---------- 标签 ----------

pub fn generate_tags(title: &str, content: &str) -> CompletionRequest {
    let note = format!("标题：{}\n\n内容：{}", title, content);
    request(
        "你是一个专业的内容分析专家，擅长为文本内容生成准确、相关的标签。",
        format!(
            "请为以下笔记内容生成3-8个相关的标签。标签应该准确反映内容的主题、类别和关键概念。\n\n{}\n\n\
             要求：\n1. 标签应该简洁明了，通常1-3个字\n2. 优先选择具体的、有意义的标签\n\
             3. 包含主题标签、类别标签和关键词标签\n4. 用逗号分隔标签\n5. 直接返回标签列表，不需要其他解释\n\n\
             示例格式：工作, 计划, 效率, 时间管理",
            note.trim()
        ),
        200,
    )
}

/// 按中英文逗号切分模型回复，最多保留 8 个
pub fn parse_tags(reply: &str) -> Vec<String> {
    reply
        .split([',', '，'])
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .take(MAX_TAGS)
        .map(str::to_string)
        .collect()
}

// ---------- 总结 ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    /// 未知长度按 medium 处理
    pub fn parse(value: &str) -> Self {
        match value {
            "short" => Self::Short,
            "long" => Self::Long,
            _ => Self::Medium,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            Self::Short => 100,
            Self::Medium => 300,
            Self::Long => 600,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::Short => "请用1-2句话简要总结",
            Self::Medium => "请用3-5句话总结",
            Self::Long => "请详细总结，包含主要观点和细节",
        }
    }
}

pub fn summarize(text: &str, length: SummaryLength) -> CompletionRequest {
    request(
        "你是一个专业的文本总结助手，能够准确提取文本的核心要点。",
        format!(
            "{}以下文本的核心内容：\n\n{}\n\n请用中文总结，突出重点。",
            length.instruction(),
            text
        ),
        length.max_tokens(),
    )
}

// ---------- 翻译 ----------

/// 语言代码转中文名，未知代码原样返回
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "英语",
        "zh" => "中文",
        "ja" => "日语",
        "ko" => "韩语",
        "fr" => "法语",
        "de" => "德语",
        "es" => "西班牙语",
        "ru" => "俄语",
        other => other,
    }
}

pub fn translate(text: &str, target: &str, source: &str) -> CompletionRequest {
    let target_name = language_name(target);
    let prompt = if source == "auto" {
        format!(
            "请将以下文本翻译成{}：\n\n{}\n\n请直接返回翻译结果，保持原文的格式和语调。",
            target_name, text
        )
    } else {
        format!(
            "请将以下{}文本翻译成{}：\n\n{}\n\n请直接返回翻译结果，保持原文的格式和语调。",
            language_name(source),
            target_name,
            text
        )
    };
    let max_tokens = (text.chars().count().saturating_mul(2)).min(1500) as u32;
    request(
        "你是一个专业的翻译助手，能够准确翻译各种语言。",
        prompt,
        max_tokens,
    )
}

// ---------- 相关性评分 ----------

pub fn relevance(query: &str, title: &str, content: &str, tags: Option<&[String]>) -> CompletionRequest {
    let title = if title.is_empty() { "无标题" } else { title };
    let tags = match tags {
        Some(tags) => tags.join(", "),
        None => "无".to_string(),
    };
    let note = format!("标题：{}\n内容：{}\n标签：{}", title, content, tags);
    request(
        "你是一个专业的文本相关性分析专家，能够准确评估查询与文档的相关性。",
        format!(
            "请评估以下查询与笔记的相关性，并给出0-1之间的分数（0表示完全不相关，1表示高度相关）。\n\n\
             查询：{}\n\n笔记：\n{}\n\n请考虑以下因素：\n1. 关键词匹配度\n2. 语义相似性\n3. 主题相关性\n4. 标签匹配度\n\n\
             请直接返回一个0-1之间的数字分数，不需要其他解释。例如：0.8",
            query,
            note.trim()
        ),
        50,
    )
}

/// 取回复中的第一个数字并截断到 [0, 1]，没有数字时为 0
pub fn parse_relevance_score(reply: &str) -> f64 {
    SCORE_PATTERN
        .find(reply)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|score| score.clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

// ---------- 连通性探测 ----------

pub fn probe() -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage::user("test")],
        max_tokens: 1,
        temperature: None,
        presence_penalty: None,
        frequency_penalty: None,
    }
}
