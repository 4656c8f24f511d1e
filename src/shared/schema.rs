diesel::table! {
    users (id) {
        id -> Int4,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        role -> Varchar,
        is_active -> Bool,
        last_login -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Int4,
        ticket_number -> Varchar,
        title -> Varchar,
        description -> Text,
        status -> Varchar,
        priority -> Varchar,
        category -> Nullable<Varchar>,
        submitter_id -> Int4,
        assigned_to -> Nullable<Int4>,
        team_id -> Nullable<Int4>,
        asset_id -> Nullable<Int4>,
        company_id -> Nullable<Int4>,
        sla_policy_id -> Nullable<Int4>,
        sla_due_date -> Nullable<Timestamptz>,
        first_response_at -> Nullable<Timestamptz>,
        resolution -> Nullable<Text>,
        time_spent_minutes -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    ticket_sequences (day) {
        day -> Date,
        next_seq -> Int4,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Int4,
        ticket_id -> Int4,
        user_id -> Int4,
        body -> Text,
        is_internal -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    time_entries (id) {
        id -> Int4,
        ticket_id -> Int4,
        user_id -> Int4,
        minutes -> Int4,
        description -> Nullable<Text>,
        billable -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_templates (id) {
        id -> Int4,
        name -> Varchar,
        category -> Nullable<Varchar>,
        title_template -> Varchar,
        description_template -> Text,
        default_priority -> Varchar,
        created_by -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_tags (id) {
        id -> Int4,
        ticket_id -> Int4,
        tag_name -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_dependencies (id) {
        id -> Int4,
        ticket_id -> Int4,
        depends_on_ticket_id -> Int4,
        dependency_type -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    custom_fields (id) {
        id -> Int4,
        name -> Varchar,
        field_type -> Varchar,
        options -> Nullable<Text>,
        is_required -> Bool,
        applies_to -> Varchar,
        position -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    custom_field_values (id) {
        id -> Int4,
        custom_field_id -> Int4,
        ticket_id -> Nullable<Int4>,
        value -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    attachments (id) {
        id -> Int4,
        filename -> Varchar,
        file_path -> Varchar,
        file_size -> Int8,
        mime_type -> Nullable<Varchar>,
        ticket_id -> Nullable<Int4>,
        comment_id -> Nullable<Int4>,
        uploaded_by -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    mentions (id) {
        id -> Int4,
        user_id -> Int4,
        comment_id -> Int4,
        ticket_id -> Int4,
        is_read -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    satisfaction_ratings (id) {
        id -> Int4,
        ticket_id -> Int4,
        rating -> Int4,
        feedback -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sla_policies (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        priority -> Varchar,
        response_time_hours -> Int4,
        resolution_time_hours -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    automation_rules (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        trigger_type -> Varchar,
        conditions -> Text,
        actions -> Text,
        is_active -> Bool,
        priority -> Int4,
        created_by -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    knowledge_categories (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        icon -> Nullable<Varchar>,
        parent_id -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    knowledge_articles (id) {
        id -> Int4,
        title -> Varchar,
        content -> Text,
        summary -> Nullable<Text>,
        category_id -> Nullable<Int4>,
        author_id -> Int4,
        tags -> Nullable<Varchar>,
        itil_process -> Nullable<Varchar>,
        article_type -> Varchar,
        version -> Int4,
        is_published -> Bool,
        is_draft -> Bool,
        view_count -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    article_versions (id) {
        id -> Int4,
        article_id -> Int4,
        version -> Int4,
        title -> Varchar,
        content -> Text,
        changed_by -> Int4,
        change_description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    article_favorites (id) {
        id -> Int4,
        article_id -> Int4,
        user_id -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    article_comments (id) {
        id -> Int4,
        article_id -> Int4,
        user_id -> Int4,
        parent_comment_id -> Nullable<Int4>,
        body -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    article_workflow_steps (id) {
        id -> Int4,
        article_id -> Int4,
        step_number -> Int4,
        title -> Varchar,
        description -> Nullable<Text>,
        code_snippet -> Nullable<Text>,
        code_language -> Nullable<Varchar>,
        success_outcome -> Nullable<Text>,
        failure_outcome -> Nullable<Text>,
        next_step_on_success -> Nullable<Int4>,
        next_step_on_failure -> Nullable<Int4>,
    }
}

diesel::table! {
    article_ticket_links (id) {
        id -> Int4,
        article_id -> Int4,
        ticket_id -> Int4,
        link_type -> Varchar,
        created_by -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    monitored_services (id) {
        id -> Int4,
        name -> Varchar,
        service_type -> Varchar,
        url -> Nullable<Varchar>,
        status -> Varchar,
        last_check -> Nullable<Timestamptz>,
        response_time_ms -> Nullable<Float8>,
        uptime_percentage -> Float8,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    alerts (id) {
        id -> Int4,
        service_id -> Int4,
        severity -> Varchar,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        acknowledged_by -> Nullable<Int4>,
        acknowledged_at -> Nullable<Timestamptz>,
        resolved_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    service_metrics (id) {
        id -> Int4,
        service_id -> Int4,
        metric_name -> Varchar,
        value -> Float8,
        unit -> Nullable<Varchar>,
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    service_slas (id) {
        id -> Int4,
        service_id -> Int4,
        name -> Varchar,
        target_uptime -> Float8,
        response_time_target -> Nullable<Float8>,
        current_uptime -> Float8,
        status -> Varchar,
        start_date -> Timestamptz,
        end_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    dashboard_widgets (id) {
        id -> Int4,
        user_id -> Int4,
        widget_type -> Varchar,
        title -> Varchar,
        config -> Nullable<Text>,
        position -> Int4,
        size -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    teams (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        team_lead_id -> Nullable<Int4>,
        email -> Nullable<Varchar>,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    team_members (id) {
        id -> Int4,
        team_id -> Int4,
        user_id -> Int4,
        role -> Varchar,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    boards (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        team_id -> Nullable<Int4>,
        created_by -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    board_columns (id) {
        id -> Int4,
        board_id -> Int4,
        name -> Varchar,
        position -> Int4,
        wip_limit -> Nullable<Int4>,
        color -> Nullable<Varchar>,
    }
}

diesel::table! {
    board_cards (id) {
        id -> Int4,
        column_id -> Int4,
        ticket_id -> Int4,
        position -> Int4,
    }
}

diesel::table! {
    appointments (id) {
        id -> Int4,
        title -> Varchar,
        description -> Nullable<Text>,
        ticket_id -> Nullable<Int4>,
        customer_id -> Int4,
        technician_id -> Int4,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        location -> Nullable<Varchar>,
        status -> Varchar,
        meeting_link -> Nullable<Varchar>,
        reminder_sent -> Bool,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    companies (id) {
        id -> Int4,
        name -> Varchar,
        domain -> Nullable<Varchar>,
        address -> Nullable<Text>,
        phone -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        website -> Nullable<Varchar>,
        contract_start -> Nullable<Timestamptz>,
        contract_end -> Nullable<Timestamptz>,
        is_active -> Bool,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    company_contacts (id) {
        id -> Int4,
        company_id -> Int4,
        user_id -> Nullable<Int4>,
        name -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        role -> Nullable<Varchar>,
        is_primary -> Bool,
    }
}

diesel::table! {
    assets (id) {
        id -> Int4,
        asset_tag -> Varchar,
        name -> Varchar,
        asset_type -> Varchar,
        company_id -> Nullable<Int4>,
        manufacturer -> Nullable<Varchar>,
        model -> Nullable<Varchar>,
        serial_number -> Nullable<Varchar>,
        purchase_date -> Nullable<Timestamptz>,
        warranty_expiry -> Nullable<Timestamptz>,
        cost -> Nullable<Float8>,
        location -> Nullable<Varchar>,
        assigned_to -> Nullable<Int4>,
        status -> Varchar,
        notes -> Nullable<Text>,
        specifications -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reports (id) {
        id -> Int4,
        name -> Varchar,
        report_type -> Varchar,
        description -> Nullable<Text>,
        config -> Text,
        created_by -> Nullable<Int4>,
        is_public -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    scheduled_reports (id) {
        id -> Int4,
        report_id -> Int4,
        frequency -> Varchar,
        recipients -> Text,
        next_run -> Timestamptz,
        is_active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(board_cards -> board_columns (column_id));
diesel::joinable!(board_cards -> tickets (ticket_id));
diesel::joinable!(board_columns -> boards (board_id));
diesel::joinable!(custom_field_values -> custom_fields (custom_field_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(time_entries -> tickets (ticket_id));
diesel::joinable!(alerts -> monitored_services (service_id));
diesel::joinable!(service_metrics -> monitored_services (service_id));
diesel::joinable!(article_versions -> knowledge_articles (article_id));
diesel::joinable!(satisfaction_ratings -> tickets (ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    boards,
    board_columns,
    board_cards,
    tickets,
    ticket_comments,
    ticket_dependencies,
    time_entries,
    custom_fields,
    custom_field_values,
    alerts,
    monitored_services,
    service_metrics,
    knowledge_articles,
    article_versions,
    satisfaction_ratings,
);
