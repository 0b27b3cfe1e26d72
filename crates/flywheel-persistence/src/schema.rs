//! Esquema Diesel (mantenido a mano, equivalente a `diesel print-schema`).

diesel::table! {
    workflows (id) {
        id -> BigInt,
        name -> Text,
        project_id -> BigInt,
        theme_color -> Text,
        theme_icon -> Text,
        create_time -> Timestamptz,
    }
}

diesel::table! {
    workflow_states (seq) {
        seq -> BigInt,
        workflow_id -> BigInt,
        name -> Text,
        category -> Text,
        #[sql_name = "order"]
        sort_order -> Integer,
        create_time -> Timestamptz,
    }
}

diesel::table! {
    workflow_state_transitions (seq) {
        seq -> BigInt,
        workflow_id -> BigInt,
        name -> Text,
        from_state -> Text,
        to_state -> Text,
        create_time -> Timestamptz,
    }
}

diesel::table! {
    works (id) {
        id -> BigInt,
        name -> Text,
        project_id -> BigInt,
        flow_id -> BigInt,
        create_time -> Timestamptz,
        state_name -> Text,
        state_category -> Text,
        state_begin_time -> Nullable<Timestamptz>,
        process_begin_time -> Nullable<Timestamptz>,
        process_end_time -> Nullable<Timestamptz>,
        archive_time -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    work_process_steps (id) {
        id -> BigInt,
        work_id -> BigInt,
        flow_id -> BigInt,
        state_name -> Text,
        state_category -> Text,
        begin_time -> Timestamptz,
        end_time -> Nullable<Timestamptz>,
        next_state_name -> Nullable<Text>,
        next_state_category -> Nullable<Text>,
        creator_id -> BigInt,
        creator_name -> Text,
    }
}

diesel::table! {
    work_state_transitions (id) {
        id -> BigInt,
        create_time -> Timestamptz,
        creator_id -> BigInt,
        work_id -> BigInt,
        flow_id -> BigInt,
        from_state -> Text,
        to_state -> Text,
    }
}

diesel::table! {
    event_outbox (id) {
        id -> BigInt,
        source_id -> BigInt,
        source_type -> Text,
        source_desc -> Text,
        category -> Text,
        updated_properties -> Jsonb,
        creator_id -> BigInt,
        creator_name -> Text,
        create_time -> Timestamptz,
        dispatch_time -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    workflows,
    workflow_states,
    workflow_state_transitions,
    works,
    work_process_steps,
    work_state_transitions,
    event_outbox,
);
