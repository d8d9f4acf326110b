/// Entity types carrying one convertible rich-text column each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Entity {
    Comment,
    Document,
    Issue,
    Journal,
    Message,
    News,
    Project,
    WikiContent,
    Setting,
}

impl Entity {
    pub fn name(self) -> &'static str {
        match self {
            Self::Comment => "Comment",
            Self::Document => "Document",
            Self::Issue => "Issue",
            Self::Journal => "Journal",
            Self::Message => "Message",
            Self::News => "News",
            Self::Project => "Project",
            Self::WikiContent => "WikiContent",
            Self::Setting => "Setting",
        }
    }
}

/// One convertible (table, column) pair. The column name doubles as the
/// reader and the writer: every access goes through SQL built from this
/// table, never through runtime reflection.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub entity: Entity,
    pub table: &'static str,
    pub column: &'static str,
}

/// All convertible entity fields, in processing order.
pub const TEXT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        entity: Entity::Comment,
        table: "comments",
        column: "comments",
    },
    FieldSpec {
        entity: Entity::Document,
        table: "documents",
        column: "description",
    },
    FieldSpec {
        entity: Entity::Issue,
        table: "issues",
        column: "description",
    },
    FieldSpec {
        entity: Entity::Journal,
        table: "journals",
        column: "notes",
    },
    FieldSpec {
        entity: Entity::Message,
        table: "messages",
        column: "content",
    },
    FieldSpec {
        entity: Entity::News,
        table: "news",
        column: "description",
    },
    FieldSpec {
        entity: Entity::Project,
        table: "projects",
        column: "description",
    },
    FieldSpec {
        entity: Entity::WikiContent,
        table: "wiki_contents",
        column: "text",
    },
];

pub const SETTINGS_TABLE: &str = "settings";

/// Name of the singleton welcome-text entry in the settings table.
pub const WELCOME_TEXT_SETTING: &str = "welcome_text";

/// Column touched on unsuppressed saves.
pub const UPDATED_ON_COLUMN: &str = "updated_on";
