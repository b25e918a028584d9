use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Persisted cache keys
pub const HISTORY_KEY: &str = "linguaecho_history";
pub const TOKEN_KEY: &str = "auth_token";

/// Local history keeps only the most recent conversations.
pub const MAX_HISTORY_ITEMS: usize = 10;
/// Page size requested from the server when listing conversations.
pub const REMOTE_HISTORY_LIMIT: u32 = 50;

/// Target language of a practice conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Japanese,
    English,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Japanese, Language::English];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Japanese => "japanese",
            Language::English => "english",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Language::Japanese => "日本語 (Japanese)",
            Language::English => "English",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|language| language.as_str() == s)
            .ok_or_else(|| format!("Unknown language: {}", s))
    }
}

/// Grouping used when presenting scenarios.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Daily,
    Social,
    Professional,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Daily, Category::Social, Category::Professional];

    pub fn label(self, language: Language) -> &'static str {
        let text = match self {
            Category::Daily => Localized::new("日常生活", "Daily Life"),
            Category::Social => Localized::new("社交", "Social"),
            Category::Professional => Localized::new("仕事・学問", "Professional/Academic"),
        };
        text.get(language)
    }
}

/// A string available in every supported language.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Localized {
    pub japanese: &'static str,
    pub english: &'static str,
}

impl Localized {
    const fn new(japanese: &'static str, english: &'static str) -> Self {
        Self { japanese, english }
    }

    pub fn get(&self, language: Language) -> &'static str {
        match language {
            Language::Japanese => self.japanese,
            Language::English => self.english,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenarioInfo {
    pub title: Localized,
    pub description: Localized,
    pub category: Category,
}

/// Role-play situation the conversation partner acts out.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Restaurant,
    Hotel,
    Supermarket,
    Transportation,
    SelfIntro,
    CasualChat,
    PhoneAppointment,
    JobInterview,
    BusinessEmail,
    Classroom,
}

impl Scenario {
    pub const ALL: [Scenario; 10] = [
        Scenario::Restaurant,
        Scenario::Hotel,
        Scenario::Supermarket,
        Scenario::Transportation,
        Scenario::SelfIntro,
        Scenario::CasualChat,
        Scenario::PhoneAppointment,
        Scenario::JobInterview,
        Scenario::BusinessEmail,
        Scenario::Classroom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scenario::Restaurant => "restaurant",
            Scenario::Hotel => "hotel",
            Scenario::Supermarket => "supermarket",
            Scenario::Transportation => "transportation",
            Scenario::SelfIntro => "self_intro",
            Scenario::CasualChat => "casual_chat",
            Scenario::PhoneAppointment => "phone_appointment",
            Scenario::JobInterview => "job_interview",
            Scenario::BusinessEmail => "business_email",
            Scenario::Classroom => "classroom",
        }
    }

    pub fn info(self) -> ScenarioInfo {
        let (title, description, category) = match self {
            Scenario::Restaurant => (
                Localized::new("レストラン注文", "Restaurant Ordering"),
                Localized::new(
                    "レストランでの注文、メニューについて質問",
                    "Ordering food and asking about menu items",
                ),
                Category::Daily,
            ),
            Scenario::Hotel => (
                Localized::new("ホテルチェックイン", "Hotel Check-in"),
                Localized::new(
                    "チェックイン手続き、施設について質問",
                    "Check-in procedures and facility inquiries",
                ),
                Category::Daily,
            ),
            Scenario::Supermarket => (
                Localized::new("スーパー買い物", "Supermarket Shopping"),
                Localized::new(
                    "商品を探す、価格やプロモーションについて質問",
                    "Finding products and asking about prices",
                ),
                Category::Daily,
            ),
            Scenario::Transportation => (
                Localized::new("道案内・交通", "Directions/Transportation"),
                Localized::new("道を尋ねる、切符を買う", "Asking for directions and buying tickets"),
                Category::Daily,
            ),
            Scenario::SelfIntro => (
                Localized::new("自己紹介", "Self-introduction"),
                Localized::new(
                    "初対面での自己紹介、背景や興味の紹介",
                    "Introducing yourself and sharing background",
                ),
                Category::Social,
            ),
            Scenario::CasualChat => (
                Localized::new("気楽な会話", "Casual Chat"),
                Localized::new(
                    "天気や週末の予定などについて友達と話す",
                    "Chatting with friends about weather and plans",
                ),
                Category::Social,
            ),
            Scenario::PhoneAppointment => (
                Localized::new("電話予約", "Phone Appointment"),
                Localized::new("電話で病院や美容院の予約", "Making appointments by phone"),
                Category::Social,
            ),
            Scenario::JobInterview => (
                Localized::new("就職面接", "Job Interview"),
                Localized::new(
                    "面接官の質問に答える、能力をアピール",
                    "Answering interview questions and showcasing skills",
                ),
                Category::Professional,
            ),
            Scenario::BusinessEmail => (
                Localized::new("ビジネスメール", "Business Email"),
                Localized::new(
                    "フォーマルなビジネスメールの書き方を学ぶ",
                    "Learning to write formal business emails",
                ),
                Category::Professional,
            ),
            Scenario::Classroom => (
                Localized::new("教室ディスカッション", "Classroom Discussion"),
                Localized::new(
                    "学術的な環境で意見を表現し質問する",
                    "Expressing opinions and asking questions in class",
                ),
                Category::Professional,
            ),
        };
        ScenarioInfo {
            title,
            description,
            category,
        }
    }

    pub fn in_category(category: Category) -> impl Iterator<Item = Scenario> {
        Scenario::ALL
            .into_iter()
            .filter(move |scenario| scenario.info().category == category)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| format!("Unknown scenario: {}", s))
    }
}
