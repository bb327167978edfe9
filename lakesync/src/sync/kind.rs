//! Entity kinds covered by the sync engine

use clap::ValueEnum;

/// One syncable entity kind from the ticketing domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum EntityKind {
    Ticket,
    Status,
    Label,
    Module,
    DataSource,
    User,
}

impl EntityKind {
    /// All kinds in pass order: kinds that embed other kinds' rows
    /// (modules, tickets) run after the kinds they reference.
    pub fn pass_order() -> [EntityKind; 6] {
        [
            EntityKind::DataSource,
            EntityKind::User,
            EntityKind::Status,
            EntityKind::Label,
            EntityKind::Module,
            EntityKind::Ticket,
        ]
    }

    /// Source table name
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "Ticket",
            EntityKind::Status => "Status",
            EntityKind::Label => "Label",
            EntityKind::Module => "Module",
            EntityKind::DataSource => "DataSource",
            EntityKind::User => "User",
        }
    }

    /// Index name suffix, appended to the configured prefix
    pub fn index_suffix(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "denormalized_tickets",
            EntityKind::Status => "statuses",
            EntityKind::Label => "labels",
            EntityKind::Module => "modules",
            EntityKind::DataSource => "data_sources",
            EntityKind::User => "users",
        }
    }

    /// Natural-id field name in the produced document
    pub fn id_field(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "ticket_id",
            EntityKind::Status => "status_id",
            EntityKind::Label => "label_id",
            EntityKind::Module => "module_id",
            EntityKind::DataSource => "data_source_id",
            EntityKind::User => "user_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Ticket => "tickets",
            EntityKind::Status => "statuses",
            EntityKind::Label => "labels",
            EntityKind::Module => "modules",
            EntityKind::DataSource => "data sources",
            EntityKind::User => "users",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
