//! Static entity registry: the declarative heart of the sync engine.
//!
//! Each mirrored upstream resource type is described by one
//! [`EntityDescriptor`]: endpoint, page size, sideloaded includes, the
//! attribute-to-column coercion table, and the foreign-key mappings
//! (plain, self-referential, and polymorphic). [`SYNC_ORDER`] is the
//! dependency order, topologically sorted by hand and pinned by a test;
//! self references are handled as a same-type second pass, so no runtime
//! cycle detection exists anywhere.

/// Identifies one mirrored upstream entity type. Variant names mirror the
/// upstream resource types listed in [`SYNC_ORDER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// `organizations`.
    Organizations,
    /// `subsidiaries`.
    Subsidiaries,
    /// `workflows`.
    Workflows,
    /// `workflow_statuses`.
    WorkflowStatuses,
    /// `tax_rates`.
    TaxRates,
    /// `document_types`.
    DocumentTypes,
    /// `people`.
    People,
    /// `teams`.
    Teams,
    /// `memberships`.
    Memberships,
    /// `companies`.
    Companies,
    /// `contact_entries`.
    ContactEntries,
    /// `projects`.
    Projects,
    /// `boards`.
    Boards,
    /// `task_lists`.
    TaskLists,
    /// `tasks`.
    Tasks,
    /// `pipelines`.
    Pipelines,
    /// `deal_statuses`.
    DealStatuses,
    /// `lost_reasons`.
    LostReasons,
    /// `service_types`.
    ServiceTypes,
    /// `deals`.
    Deals,
    /// `services`.
    Services,
    /// `custom_fields`.
    CustomFields,
    /// `cf_deals`, the denormalized custom-field value rows.
    CfDeals,
    /// `invoices`.
    Invoices,
    /// `line_items`.
    LineItems,
    /// `payments`.
    Payments,
    /// `expenses`.
    Expenses,
    /// `time_entries`.
    TimeEntries,
    /// `time_entry_versions`, the append-only history rows.
    TimeEntryVersions,
    /// `comments`.
    Comments,
    /// `attachments`.
    Attachments,
}

/// Column storage class used for SQL casts and value coercion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// UTF-8 text.
    Text,
    /// 64-bit integer.
    BigInt,
    /// Boolean flag.
    Bool,
    /// Arbitrary-precision decimal, carried as a canonical numeric literal.
    Decimal,
    /// UTC timestamp.
    Timestamp,
    /// Calendar date.
    Date,
    /// JSON document.
    Json,
}

/// Attribute coercion applied while flattening a resource into a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Pass through as text.
    Text,
    /// Integer, accepted as a JSON number or numeric string.
    BigInt,
    /// Boolean.
    Bool,
    /// Decimal, accepted as a JSON number or numeric string.
    Decimal,
    /// ISO-8601 timestamp.
    Timestamp,
    /// ISO-8601 calendar date.
    Date,
    /// JSON value preserved verbatim.
    Json,
    /// Version-history diff payload; malformed or empty input maps to the
    /// "no changes recorded" sentinel instead of failing the row.
    ObjectChanges,
}

impl Coercion {
    /// Storage class the coercion produces.
    pub const fn column_kind(self) -> ColumnKind {
        match self {
            Self::Text => ColumnKind::Text,
            Self::BigInt => ColumnKind::BigInt,
            Self::Bool => ColumnKind::Bool,
            Self::Decimal => ColumnKind::Decimal,
            Self::Timestamp => ColumnKind::Timestamp,
            Self::Date => ColumnKind::Date,
            Self::Json | Self::ObjectChanges => ColumnKind::Json,
        }
    }
}

/// One attribute-to-column mapping with its coercion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeMapping {
    /// Upstream attribute field name.
    pub field: &'static str,
    /// Local column name.
    pub column: &'static str,
    /// Coercion applied to the raw value.
    pub coercion: Coercion,
    /// Whether a missing or null value fails the row.
    pub required: bool,
}

/// A single-valued relationship resolved into one foreign-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceMapping {
    /// Upstream relationship name.
    pub relationship: &'static str,
    /// Local foreign-key column.
    pub column: &'static str,
    /// Entity type the column points at.
    pub target: EntityKind,
    /// Self references resolve in a second pass over the same entity type.
    pub self_referential: bool,
}

/// One admissible target of a polymorphic relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolymorphicTarget {
    /// Upstream type tag selecting this target.
    pub type_tag: &'static str,
    /// Foreign-key column populated when this target is selected.
    pub column: &'static str,
    /// Entity type the column points at.
    pub target: EntityKind,
}

/// A relationship whose target type varies per row, stored as a tagged
/// union: one type-tag column plus one FK column per admissible target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolymorphicMapping {
    /// Upstream relationship name.
    pub relationship: &'static str,
    /// Column recording the selected type tag.
    pub tag_column: &'static str,
    /// Mutually exclusive FK columns.
    pub targets: &'static [PolymorphicTarget],
}

/// Full declarative description of one mirrored entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity identity.
    pub kind: EntityKind,
    /// Upstream JSON:API resource type; also the endpoint path segment and
    /// the key used in stats payloads.
    pub resource_type: &'static str,
    /// Local table name.
    pub table: &'static str,
    /// Requested page size.
    pub page_size: u32,
    /// Relationships sideloaded via `include`.
    pub includes: &'static [&'static str],
    /// Attribute coercion table.
    pub attributes: &'static [AttributeMapping],
    /// Single-valued relationship mappings.
    pub references: &'static [ReferenceMapping],
    /// Polymorphic relationship mappings.
    pub polymorphics: &'static [PolymorphicMapping],
    /// Extra uniqueness constraint enforced by the store, as (column, column).
    pub unique_by: Option<(&'static str, &'static str)>,
}

/// Name and storage class of one mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: &'static str,
    /// Storage class.
    pub kind: ColumnKind,
}

impl EntityDescriptor {
    /// All mapped columns in canonical order: attributes, then plain
    /// references, then each polymorphic tag column followed by its FK
    /// columns. [`crate::domain::mapper`] emits rows in exactly this order.
    pub fn columns(&self) -> Vec<ColumnSpec> {
        let mut columns = Vec::new();
        for attribute in self.attributes {
            columns.push(ColumnSpec {
                name: attribute.column,
                kind: attribute.coercion.column_kind(),
            });
        }
        for reference in self.references {
            columns.push(ColumnSpec {
                name: reference.column,
                kind: ColumnKind::BigInt,
            });
        }
        for polymorphic in self.polymorphics {
            columns.push(ColumnSpec {
                name: polymorphic.tag_column,
                kind: ColumnKind::Text,
            });
            for target in polymorphic.targets {
                columns.push(ColumnSpec {
                    name: target.column,
                    kind: ColumnKind::BigInt,
                });
            }
        }
        columns
    }

    /// Relationship names with the column whose non-null count measures how
    /// often the relationship resolved (FK column for plain references, tag
    /// column for polymorphic ones). Drives `relationship_stats`.
    pub fn relation_columns(&self) -> Vec<(&'static str, &'static str)> {
        let mut relations = Vec::new();
        for reference in self.references {
            relations.push((reference.relationship, reference.column));
        }
        for polymorphic in self.polymorphics {
            relations.push((polymorphic.relationship, polymorphic.tag_column));
        }
        relations
    }
}

const fn attr(field: &'static str, column: &'static str, coercion: Coercion) -> AttributeMapping {
    AttributeMapping {
        field,
        column,
        coercion,
        required: false,
    }
}

const fn req(field: &'static str, column: &'static str, coercion: Coercion) -> AttributeMapping {
    AttributeMapping {
        field,
        column,
        coercion,
        required: true,
    }
}

const fn fk(
    relationship: &'static str,
    column: &'static str,
    target: EntityKind,
) -> ReferenceMapping {
    ReferenceMapping {
        relationship,
        column,
        target,
        self_referential: false,
    }
}

const fn self_fk(
    relationship: &'static str,
    column: &'static str,
    target: EntityKind,
) -> ReferenceMapping {
    ReferenceMapping {
        relationship,
        column,
        target,
        self_referential: true,
    }
}

const fn poly(
    type_tag: &'static str,
    column: &'static str,
    target: EntityKind,
) -> PolymorphicTarget {
    PolymorphicTarget {
        type_tag,
        column,
        target,
    }
}

/// Entity types in strict dependency order: a type appears only after every
/// type it references (self references excepted, handled by the second pass).
pub const SYNC_ORDER: [EntityKind; 31] = [
    EntityKind::Organizations,
    EntityKind::Subsidiaries,
    EntityKind::Workflows,
    EntityKind::WorkflowStatuses,
    EntityKind::TaxRates,
    EntityKind::DocumentTypes,
    EntityKind::People,
    EntityKind::Teams,
    EntityKind::Memberships,
    EntityKind::Companies,
    EntityKind::ContactEntries,
    EntityKind::Projects,
    EntityKind::Boards,
    EntityKind::TaskLists,
    EntityKind::Tasks,
    EntityKind::Pipelines,
    EntityKind::DealStatuses,
    EntityKind::LostReasons,
    EntityKind::ServiceTypes,
    EntityKind::Deals,
    EntityKind::Services,
    EntityKind::CustomFields,
    EntityKind::CfDeals,
    EntityKind::Invoices,
    EntityKind::LineItems,
    EntityKind::Payments,
    EntityKind::Expenses,
    EntityKind::TimeEntries,
    EntityKind::TimeEntryVersions,
    EntityKind::Comments,
    EntityKind::Attachments,
];

impl EntityKind {
    /// Static descriptor for this entity type.
    pub fn descriptor(self) -> &'static EntityDescriptor {
        match self {
            Self::Organizations => &ORGANIZATIONS,
            Self::Subsidiaries => &SUBSIDIARIES,
            Self::Workflows => &WORKFLOWS,
            Self::WorkflowStatuses => &WORKFLOW_STATUSES,
            Self::TaxRates => &TAX_RATES,
            Self::DocumentTypes => &DOCUMENT_TYPES,
            Self::People => &PEOPLE,
            Self::Teams => &TEAMS,
            Self::Memberships => &MEMBERSHIPS,
            Self::Companies => &COMPANIES,
            Self::ContactEntries => &CONTACT_ENTRIES,
            Self::Projects => &PROJECTS,
            Self::Boards => &BOARDS,
            Self::TaskLists => &TASK_LISTS,
            Self::Tasks => &TASKS,
            Self::Pipelines => &PIPELINES,
            Self::DealStatuses => &DEAL_STATUSES,
            Self::LostReasons => &LOST_REASONS,
            Self::ServiceTypes => &SERVICE_TYPES,
            Self::Deals => &DEALS,
            Self::Services => &SERVICES,
            Self::CustomFields => &CUSTOM_FIELDS,
            Self::CfDeals => &CF_DEALS,
            Self::Invoices => &INVOICES,
            Self::LineItems => &LINE_ITEMS,
            Self::Payments => &PAYMENTS,
            Self::Expenses => &EXPENSES,
            Self::TimeEntries => &TIME_ENTRIES,
            Self::TimeEntryVersions => &TIME_ENTRY_VERSIONS,
            Self::Comments => &COMMENTS,
            Self::Attachments => &ATTACHMENTS,
        }
    }

    /// Upstream resource type tag, used as the stats key everywhere.
    pub fn resource_type(self) -> &'static str {
        self.descriptor().resource_type
    }

    /// Entity kind mirroring the given resource type tag, if any. Sideloaded
    /// payloads carry tags for types outside the registry, so a miss is not
    /// an error.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        SYNC_ORDER
            .into_iter()
            .find(|kind| kind.resource_type() == resource_type)
    }
}

static ORGANIZATIONS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Organizations,
    resource_type: "organizations",
    table: "organizations",
    page_size: 100,
    includes: &[],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("created_at", "created_at", Coercion::Timestamp),
        attr("updated_at", "updated_at", Coercion::Timestamp),
    ],
    references: &[],
    polymorphics: &[],
    unique_by: None,
};

static SUBSIDIARIES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Subsidiaries,
    resource_type: "subsidiaries",
    table: "subsidiaries",
    page_size: 100,
    includes: &["organization"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("invoice_number_format", "invoice_number_format", Coercion::Text),
        attr("updated_at", "updated_at", Coercion::Timestamp),
    ],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static WORKFLOWS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Workflows,
    resource_type: "workflows",
    table: "workflows",
    page_size: 100,
    includes: &["organization"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("archived", "archived", Coercion::Bool),
    ],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static WORKFLOW_STATUSES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::WorkflowStatuses,
    resource_type: "workflow_statuses",
    table: "workflow_statuses",
    page_size: 200,
    includes: &["workflow"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("color_id", "color_id", Coercion::BigInt),
        attr("position", "position", Coercion::BigInt),
        attr("category_id", "category_id", Coercion::BigInt),
    ],
    references: &[fk("workflow", "workflow_id", EntityKind::Workflows)],
    polymorphics: &[],
    unique_by: None,
};

static TAX_RATES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TaxRates,
    resource_type: "tax_rates",
    table: "tax_rates",
    page_size: 100,
    includes: &["subsidiary"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("rate", "rate", Coercion::Decimal),
    ],
    references: &[fk("subsidiary", "subsidiary_id", EntityKind::Subsidiaries)],
    polymorphics: &[],
    unique_by: None,
};

static DOCUMENT_TYPES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::DocumentTypes,
    resource_type: "document_types",
    table: "document_types",
    page_size: 100,
    includes: &["subsidiary"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("tag", "tag", Coercion::Text),
    ],
    references: &[fk("subsidiary", "subsidiary_id", EntityKind::Subsidiaries)],
    polymorphics: &[],
    unique_by: None,
};

static PEOPLE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::People,
    resource_type: "people",
    table: "people",
    page_size: 200,
    includes: &["organization", "manager"],
    attributes: &[
        attr("first_name", "first_name", Coercion::Text),
        attr("last_name", "last_name", Coercion::Text),
        req("email", "email", Coercion::Text),
        attr("active", "active", Coercion::Bool),
        attr("joined_at", "joined_at", Coercion::Timestamp),
    ],
    references: &[
        fk("organization", "organization_id", EntityKind::Organizations),
        self_fk("manager", "manager_id", EntityKind::People),
    ],
    polymorphics: &[],
    unique_by: None,
};

static TEAMS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Teams,
    resource_type: "teams",
    table: "teams",
    page_size: 100,
    includes: &["organization"],
    attributes: &[req("name", "name", Coercion::Text)],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static MEMBERSHIPS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Memberships,
    resource_type: "memberships",
    table: "memberships",
    page_size: 200,
    includes: &["team", "person"],
    attributes: &[attr("role", "role", Coercion::Text)],
    references: &[
        fk("team", "team_id", EntityKind::Teams),
        fk("person", "person_id", EntityKind::People),
    ],
    polymorphics: &[],
    unique_by: None,
};

static COMPANIES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Companies,
    resource_type: "companies",
    table: "companies",
    page_size: 200,
    includes: &["organization"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("billing_name", "billing_name", Coercion::Text),
        attr("vat", "vat", Coercion::Text),
        attr("default_currency", "default_currency", Coercion::Text),
        attr("created_at", "created_at", Coercion::Timestamp),
    ],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static CONTACT_ENTRIES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::ContactEntries,
    resource_type: "contact_entries",
    table: "contact_entries",
    page_size: 200,
    includes: &["contactable"],
    attributes: &[
        req("contact_type", "contact_type", Coercion::Text),
        req("value", "value", Coercion::Text),
    ],
    references: &[],
    polymorphics: &[PolymorphicMapping {
        relationship: "contactable",
        tag_column: "contactable_type",
        targets: &[
            poly("companies", "company_id", EntityKind::Companies),
            poly("people", "person_id", EntityKind::People),
        ],
    }],
    unique_by: None,
};

static PROJECTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Projects,
    resource_type: "projects",
    table: "projects",
    page_size: 100,
    includes: &["company", "project_manager", "workflow"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("number", "number", Coercion::Text),
        attr("archived_at", "archived_at", Coercion::Timestamp),
        attr("created_at", "created_at", Coercion::Timestamp),
    ],
    references: &[
        fk("company", "company_id", EntityKind::Companies),
        fk("project_manager", "project_manager_id", EntityKind::People),
        fk("workflow", "workflow_id", EntityKind::Workflows),
    ],
    polymorphics: &[],
    unique_by: None,
};

static BOARDS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Boards,
    resource_type: "boards",
    table: "boards",
    page_size: 100,
    includes: &["project"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("position", "position", Coercion::BigInt),
    ],
    references: &[fk("project", "project_id", EntityKind::Projects)],
    polymorphics: &[],
    unique_by: None,
};

static TASK_LISTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TaskLists,
    resource_type: "task_lists",
    table: "task_lists",
    page_size: 200,
    includes: &["board", "project"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("position", "position", Coercion::BigInt),
        attr("archived", "archived", Coercion::Bool),
    ],
    references: &[
        fk("board", "board_id", EntityKind::Boards),
        fk("project", "project_id", EntityKind::Projects),
    ],
    polymorphics: &[],
    unique_by: None,
};

static TASKS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Tasks,
    resource_type: "tasks",
    table: "tasks",
    page_size: 200,
    includes: &["project", "board", "task_list", "assignee", "workflow_status", "parent_task"],
    attributes: &[
        req("title", "title", Coercion::Text),
        attr("description", "description", Coercion::Text),
        attr("due_date", "due_date", Coercion::Date),
        attr("closed", "closed", Coercion::Bool),
        attr("created_at", "created_at", Coercion::Timestamp),
        attr("updated_at", "updated_at", Coercion::Timestamp),
    ],
    references: &[
        fk("project", "project_id", EntityKind::Projects),
        fk("board", "board_id", EntityKind::Boards),
        fk("task_list", "task_list_id", EntityKind::TaskLists),
        fk("assignee", "assignee_id", EntityKind::People),
        fk("workflow_status", "workflow_status_id", EntityKind::WorkflowStatuses),
        self_fk("parent_task", "parent_task_id", EntityKind::Tasks),
    ],
    polymorphics: &[],
    unique_by: None,
};

static PIPELINES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Pipelines,
    resource_type: "pipelines",
    table: "pipelines",
    page_size: 100,
    includes: &["organization"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("position", "position", Coercion::BigInt),
    ],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static DEAL_STATUSES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::DealStatuses,
    resource_type: "deal_statuses",
    table: "deal_statuses",
    page_size: 100,
    includes: &["pipeline"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("position", "position", Coercion::BigInt),
        attr("probability", "probability", Coercion::BigInt),
    ],
    references: &[fk("pipeline", "pipeline_id", EntityKind::Pipelines)],
    polymorphics: &[],
    unique_by: None,
};

static LOST_REASONS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::LostReasons,
    resource_type: "lost_reasons",
    table: "lost_reasons",
    page_size: 100,
    includes: &["organization"],
    attributes: &[req("name", "name", Coercion::Text)],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static SERVICE_TYPES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::ServiceTypes,
    resource_type: "service_types",
    table: "service_types",
    page_size: 100,
    includes: &["organization"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("archived", "archived", Coercion::Bool),
    ],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static DEALS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Deals,
    resource_type: "deals",
    table: "deals",
    page_size: 100,
    includes: &["company", "responsible", "pipeline", "deal_status", "lost_reason", "project"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("value", "value", Coercion::Decimal),
        attr("currency", "currency", Coercion::Text),
        attr("probability", "probability", Coercion::BigInt),
        attr("closing_date", "closing_date", Coercion::Date),
        attr("created_at", "created_at", Coercion::Timestamp),
    ],
    references: &[
        fk("company", "company_id", EntityKind::Companies),
        fk("responsible", "responsible_id", EntityKind::People),
        fk("pipeline", "pipeline_id", EntityKind::Pipelines),
        fk("deal_status", "deal_status_id", EntityKind::DealStatuses),
        fk("lost_reason", "lost_reason_id", EntityKind::LostReasons),
        fk("project", "project_id", EntityKind::Projects),
    ],
    polymorphics: &[],
    unique_by: None,
};

static SERVICES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Services,
    resource_type: "services",
    table: "services",
    page_size: 200,
    includes: &["deal", "service_type"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("price", "price", Coercion::Decimal),
        attr("quantity", "quantity", Coercion::Decimal),
        attr("billable", "billable", Coercion::Bool),
    ],
    references: &[
        fk("deal", "deal_id", EntityKind::Deals),
        fk("service_type", "service_type_id", EntityKind::ServiceTypes),
    ],
    polymorphics: &[],
    unique_by: None,
};

static CUSTOM_FIELDS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::CustomFields,
    resource_type: "custom_fields",
    table: "custom_fields",
    page_size: 100,
    includes: &["organization"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("data_type", "data_type", Coercion::Text),
    ],
    references: &[fk("organization", "organization_id", EntityKind::Organizations)],
    polymorphics: &[],
    unique_by: None,
};

static CF_DEALS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::CfDeals,
    resource_type: "cf_deals",
    table: "cf_deals",
    page_size: 500,
    includes: &["deal", "custom_field"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("value", "value", Coercion::Text),
    ],
    references: &[
        fk("deal", "deal_id", EntityKind::Deals),
        fk("custom_field", "custom_field_id", EntityKind::CustomFields),
    ],
    polymorphics: &[],
    unique_by: Some(("deal_id", "custom_field_id")),
};

static INVOICES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Invoices,
    resource_type: "invoices",
    table: "invoices",
    page_size: 100,
    includes: &["company", "subsidiary", "document_type", "deal", "tax_rate"],
    attributes: &[
        req("number", "number", Coercion::Text),
        attr("subject", "subject", Coercion::Text),
        attr("amount", "amount", Coercion::Decimal),
        attr("currency", "currency", Coercion::Text),
        attr("invoiced_on", "invoiced_on", Coercion::Date),
        attr("sent_at", "sent_at", Coercion::Timestamp),
        attr("paid_at", "paid_at", Coercion::Timestamp),
    ],
    references: &[
        fk("company", "company_id", EntityKind::Companies),
        fk("subsidiary", "subsidiary_id", EntityKind::Subsidiaries),
        fk("document_type", "document_type_id", EntityKind::DocumentTypes),
        fk("deal", "deal_id", EntityKind::Deals),
        fk("tax_rate", "tax_rate_id", EntityKind::TaxRates),
    ],
    polymorphics: &[],
    unique_by: None,
};

static LINE_ITEMS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::LineItems,
    resource_type: "line_items",
    table: "line_items",
    page_size: 500,
    includes: &["invoice", "service"],
    attributes: &[
        req("description", "description", Coercion::Text),
        attr("quantity", "quantity", Coercion::Decimal),
        attr("unit_price", "unit_price", Coercion::Decimal),
        attr("amount", "amount", Coercion::Decimal),
    ],
    references: &[
        fk("invoice", "invoice_id", EntityKind::Invoices),
        fk("service", "service_id", EntityKind::Services),
    ],
    polymorphics: &[],
    unique_by: None,
};

static PAYMENTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Payments,
    resource_type: "payments",
    table: "payments",
    page_size: 200,
    includes: &["invoice"],
    attributes: &[
        attr("amount", "amount", Coercion::Decimal),
        attr("paid_on", "paid_on", Coercion::Date),
        attr("note", "note", Coercion::Text),
    ],
    references: &[fk("invoice", "invoice_id", EntityKind::Invoices)],
    polymorphics: &[],
    unique_by: None,
};

static EXPENSES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Expenses,
    resource_type: "expenses",
    table: "expenses",
    page_size: 200,
    includes: &["deal", "person", "service_type", "approved_by"],
    attributes: &[
        req("name", "name", Coercion::Text),
        attr("amount", "amount", Coercion::Decimal),
        attr("date", "spent_on", Coercion::Date),
        attr("reimbursable", "reimbursable", Coercion::Bool),
    ],
    references: &[
        fk("deal", "deal_id", EntityKind::Deals),
        fk("person", "person_id", EntityKind::People),
        fk("service_type", "service_type_id", EntityKind::ServiceTypes),
        fk("approved_by", "approved_by_id", EntityKind::People),
    ],
    polymorphics: &[],
    unique_by: None,
};

static TIME_ENTRIES: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TimeEntries,
    resource_type: "time_entries",
    table: "time_entries",
    page_size: 500,
    includes: &["person", "service", "task", "approved_by"],
    attributes: &[
        req("date", "worked_on", Coercion::Date),
        req("time", "minutes", Coercion::BigInt),
        attr("note", "note", Coercion::Text),
        attr("billable_time", "billable_minutes", Coercion::BigInt),
        attr("updated_at", "updated_at", Coercion::Timestamp),
    ],
    references: &[
        fk("person", "person_id", EntityKind::People),
        fk("service", "service_id", EntityKind::Services),
        fk("task", "task_id", EntityKind::Tasks),
        fk("approved_by", "approved_by_id", EntityKind::People),
    ],
    polymorphics: &[],
    unique_by: None,
};

static TIME_ENTRY_VERSIONS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TimeEntryVersions,
    resource_type: "time_entry_versions",
    table: "time_entry_versions",
    page_size: 500,
    includes: &["time_entry"],
    attributes: &[
        req("event", "event", Coercion::Text),
        attr("object_changes", "object_changes", Coercion::ObjectChanges),
        req("created_at", "created_at", Coercion::Timestamp),
    ],
    references: &[fk("time_entry", "time_entry_id", EntityKind::TimeEntries)],
    polymorphics: &[],
    unique_by: None,
};

static COMMENTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Comments,
    resource_type: "comments",
    table: "comments",
    page_size: 200,
    includes: &["creator", "commentable"],
    attributes: &[
        req("body", "body", Coercion::Text),
        attr("created_at", "created_at", Coercion::Timestamp),
    ],
    references: &[fk("creator", "creator_id", EntityKind::People)],
    polymorphics: &[PolymorphicMapping {
        relationship: "commentable",
        tag_column: "commentable_type",
        targets: &[
            poly("tasks", "task_id", EntityKind::Tasks),
            poly("deals", "deal_id", EntityKind::Deals),
            poly("invoices", "invoice_id", EntityKind::Invoices),
        ],
    }],
    unique_by: None,
};

static ATTACHMENTS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Attachments,
    resource_type: "attachments",
    table: "attachments",
    page_size: 100,
    includes: &["creator", "attachable"],
    attributes: &[
        req("file_name", "file_name", Coercion::Text),
        attr("content_type", "content_type", Coercion::Text),
        attr("size", "byte_size", Coercion::BigInt),
        attr("created_at", "created_at", Coercion::Timestamp),
    ],
    references: &[fk("creator", "creator_id", EntityKind::People)],
    polymorphics: &[PolymorphicMapping {
        relationship: "attachable",
        tag_column: "attachable_type",
        targets: &[
            poly("tasks", "task_id", EntityKind::Tasks),
            poly("deals", "deal_id", EntityKind::Deals),
            poly("invoices", "invoice_id", EntityKind::Invoices),
            poly("expenses", "expense_id", EntityKind::Expenses),
            poly("comments", "comment_id", EntityKind::Comments),
        ],
    }],
    unique_by: None,
};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn sync_order_covers_every_entity_exactly_once() {
        let unique: HashSet<EntityKind> = SYNC_ORDER.iter().copied().collect();
        assert_eq!(unique.len(), SYNC_ORDER.len(), "no duplicates in the order");
    }

    #[test]
    fn descriptors_agree_with_their_kind() {
        for kind in SYNC_ORDER {
            assert_eq!(kind.descriptor().kind, kind);
        }
    }

    #[test]
    fn dependency_order_places_targets_before_referrers() {
        let position = |kind: EntityKind| {
            SYNC_ORDER
                .iter()
                .position(|candidate| *candidate == kind)
                .expect("every kind appears in the order")
        };
        for kind in SYNC_ORDER {
            let own = position(kind);
            let descriptor = kind.descriptor();
            for reference in descriptor.references {
                if reference.self_referential {
                    assert_eq!(
                        reference.target, kind,
                        "self references must point at their own type"
                    );
                    continue;
                }
                assert!(
                    position(reference.target) < own,
                    "{} must sync after {}",
                    descriptor.resource_type,
                    reference.target.resource_type(),
                );
            }
            for polymorphic in descriptor.polymorphics {
                for target in polymorphic.targets {
                    assert!(
                        position(target.target) < own,
                        "{} must sync after polymorphic target {}",
                        descriptor.resource_type,
                        target.target.resource_type(),
                    );
                }
            }
        }
    }

    #[test]
    fn resource_types_and_tables_are_unique() {
        let mut types = HashSet::new();
        let mut tables = HashSet::new();
        for kind in SYNC_ORDER {
            let descriptor = kind.descriptor();
            assert!(types.insert(descriptor.resource_type));
            assert!(tables.insert(descriptor.table));
        }
    }

    #[test]
    fn column_order_starts_with_attributes_and_has_no_duplicates() {
        for kind in SYNC_ORDER {
            let descriptor = kind.descriptor();
            let columns = descriptor.columns();
            let names: HashSet<&str> = columns.iter().map(|column| column.name).collect();
            assert_eq!(
                names.len(),
                columns.len(),
                "duplicate column in {}",
                descriptor.resource_type
            );
            for (attribute, column) in descriptor.attributes.iter().zip(columns.iter()) {
                assert_eq!(attribute.column, column.name);
            }
        }
    }

    #[test]
    fn polymorphic_targets_are_mutually_exclusive_columns() {
        let descriptor = EntityKind::Attachments.descriptor();
        let polymorphic = descriptor
            .polymorphics
            .first()
            .expect("attachments declare a polymorphic owner");
        let columns: HashSet<&str> = polymorphic
            .targets
            .iter()
            .map(|target| target.column)
            .collect();
        assert_eq!(columns.len(), polymorphic.targets.len());
    }

    #[test]
    fn custom_field_values_carry_a_pair_uniqueness_constraint() {
        let descriptor = EntityKind::CfDeals.descriptor();
        assert_eq!(descriptor.unique_by, Some(("deal_id", "custom_field_id")));
    }

    #[test]
    fn resource_type_lookup_round_trips_and_rejects_strangers() {
        for kind in SYNC_ORDER {
            assert_eq!(EntityKind::from_resource_type(kind.resource_type()), Some(kind));
        }
        assert_eq!(EntityKind::from_resource_type("webhooks"), None);
    }
}
