#![forbid(unsafe_code)]

use crate::params::{
    BulkDeleteParams, ContactParams, CreateContactParams, CreateEntityParams,
    ListParams, RoleParams, SetArchivedParams, SummarizeParams, TabsParams, TargetParams,
    TransitionParams, TrashParams, parse,
};
use crate::protocol::{
    JsonRpcRequest, METHOD_NOT_FOUND, ServiceError, failure, json_rpc_error, success,
};
use crate::render;
use crm_core::SummaryFilter;
use crm_storage::{
    BulkDeleteRequest, CreateContactRequest, CreateEntityRequest, EntityRef,
    ListEntitiesRequest, ListTrashRequest, RoleOpRequest, SetArchivedRequest, SqliteStore,
    TransitionRequest,
};
use serde_json::{Value, json};

type MethodResult = Result<Value, ServiceError>;

pub(crate) struct CrmServer {
    store: SqliteStore,
}

impl CrmServer {
    pub(crate) fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Returns `None` for notifications (requests without an id).
    pub(crate) fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        let id = request.id;
        let params = request.params.unwrap_or(Value::Null);
        let method = request.method.as_str();
        let result = match method {
            "ping" => Ok(json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") })),
            "entity.create" => self.entity_create(params),
            "entity.get" => self.entity_get(params),
            "entity.list" => self.entity_list(params),
            "entity.trash" => self.entity_trash(params),
            "entity.transition" => self.entity_transition(params),
            "entity.set_archived" => self.entity_set_archived(params),
            "entity.delete" => self.entity_delete(params),
            "entity.restore" => self.entity_restore(params),
            "entity.bulk_delete" => self.entity_bulk_delete(params),
            "entity.events" => self.entity_events(params),
            "contact.create" => self.contact_create(params),
            "contact.get" => self.contact_get(params),
            "contact.role" => self.contact_role(params),
            "stats.summarize" => self.stats_summarize(params),
            "stats.tabs" => self.stats_tabs(params),
            _ => {
                log::debug!("unknown method: {method}");
                return id.map(|id| {
                    json_rpc_error(Some(id), METHOD_NOT_FOUND, &format!("Unknown method: {method}"))
                });
            }
        };

        let response = match result {
            Ok(value) => success(id.clone(), value),
            Err(err) => {
                if err.status() >= 500 {
                    log::error!("{method} failed: {}", err.message());
                } else {
                    log::debug!("{method} rejected: {} {}", err.code(), err.message());
                }
                failure(id.clone(), &err)
            }
        };
        id.map(|_| response)
    }

    fn entity_create(&mut self, params: Value) -> MethodResult {
        let p: CreateEntityParams = parse(params)?;
        let created = self.store.create_entity(
            &p.caller,
            CreateEntityRequest {
                entity_type: p.entity_type,
                title: p.title,
                owner_id: p.owner_id,
                raw_status: p.status,
                volume: p.volume,
                commission: p.commission,
            },
        )?;
        Ok(render::entity(&created))
    }

    fn entity_get(&mut self, params: Value) -> MethodResult {
        let p: TargetParams = parse(params)?;
        let entity = self
            .store
            .resolve_and_fetch(&p.caller, &EntityRef::new(p.entity_type, p.id))?;
        Ok(render::entity(&entity))
    }

    fn entity_list(&mut self, params: Value) -> MethodResult {
        let p: ListParams = parse(params)?;
        let entities = self.store.list_entities(
            &p.caller,
            ListEntitiesRequest {
                entity_type: p.entity_type,
                category: p.category,
                include_archived: p.include_archived,
                limit: p.limit,
                offset: p.offset,
            },
        )?;
        Ok(render::entity_page(&entities))
    }

    fn entity_trash(&mut self, params: Value) -> MethodResult {
        let p: TrashParams = parse(params)?;
        let entities = self.store.list_trash(
            &p.caller,
            ListTrashRequest {
                entity_type: p.entity_type,
                limit: p.limit,
                offset: p.offset,
            },
        )?;
        Ok(render::entity_page(&entities))
    }

    fn entity_transition(&mut self, params: Value) -> MethodResult {
        let p: TransitionParams = parse(params)?;
        let change = self.store.transition(
            &p.caller,
            TransitionRequest {
                target: EntityRef::new(p.entity_type, p.id),
                to_status: p.to_status,
                expected_revision: p.expected_revision,
            },
        )?;
        Ok(render::entity_change(&change))
    }

    fn entity_set_archived(&mut self, params: Value) -> MethodResult {
        let p: SetArchivedParams = parse(params)?;
        let change = self.store.set_archived(
            &p.caller,
            SetArchivedRequest {
                target: EntityRef::new(p.entity_type, p.id),
                archived: p.archived,
                expected_revision: p.expected_revision,
            },
        )?;
        Ok(render::entity_change(&change))
    }

    fn entity_delete(&mut self, params: Value) -> MethodResult {
        let p: TargetParams = parse(params)?;
        let change = self.store.soft_delete(
            &p.caller,
            &EntityRef::new(p.entity_type, p.id),
            p.expected_revision,
        )?;
        Ok(render::entity_change(&change))
    }

    fn entity_restore(&mut self, params: Value) -> MethodResult {
        let p: TargetParams = parse(params)?;
        let change = self.store.restore(
            &p.caller,
            &EntityRef::new(p.entity_type, p.id),
            p.expected_revision,
        )?;
        Ok(render::entity_change(&change))
    }

    fn entity_bulk_delete(&mut self, params: Value) -> MethodResult {
        let p: BulkDeleteParams = parse(params)?;
        let outcomes = self.store.bulk_soft_delete(
            &p.caller,
            BulkDeleteRequest {
                entity_type: p.entity_type,
                ids: p.ids,
            },
        )?;
        Ok(render::bulk_outcomes(&outcomes))
    }

    fn entity_events(&mut self, params: Value) -> MethodResult {
        let p: TargetParams = parse(params)?;
        let rows = self
            .store
            .list_entity_events(&p.caller, &EntityRef::new(p.entity_type, p.id))?;
        Ok(render::events(&rows))
    }

    fn contact_create(&mut self, params: Value) -> MethodResult {
        let p: CreateContactParams = parse(params)?;
        let contact = self.store.create_contact(
            &p.caller,
            CreateContactRequest {
                display_name: p.display_name,
                email: p.email,
                phone: p.phone,
                initial_role: p.initial_role,
            },
        )?;
        Ok(render::contact(&contact))
    }

    fn contact_get(&mut self, params: Value) -> MethodResult {
        let p: ContactParams = parse(params)?;
        let contact = self.store.get_contact(&p.caller, p.contact_id)?;
        Ok(render::contact(&contact))
    }

    fn contact_role(&mut self, params: Value) -> MethodResult {
        let p: RoleParams = parse(params)?;
        let op = p.role_op();
        let result = self.store.role_op(
            &p.caller,
            RoleOpRequest {
                contact_id: p.contact_id,
                op,
                expected_revision: p.expected_revision,
            },
        )?;
        Ok(render::role_op(&result))
    }

    fn stats_summarize(&mut self, params: Value) -> MethodResult {
        let p: SummarizeParams = parse(params)?;
        let summary = self.store.summarize(
            &p.caller,
            p.entity_type,
            SummaryFilter {
                include_archived: p.include_archived,
                include_deleted: p.include_deleted,
            },
        )?;
        Ok(render::summary(&summary))
    }

    fn stats_tabs(&mut self, params: Value) -> MethodResult {
        let p: TabsParams = parse(params)?;
        let tabs = self.store.tab_counts(&p.caller, p.entity_type)?;
        Ok(render::tabs(&tabs))
    }
}

