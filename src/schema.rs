diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
    }
}

diesel::table! {
    signature_images (user_id) {
        user_id -> Uuid,
        image_file -> Varchar,
        uploaded_at -> Timestamp,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        owner_id -> Uuid,
        file -> Varchar,
        uploaded_at -> Timestamp,
        signed -> Bool,
    }
}

diesel::table! {
    signature_fields (id) {
        id -> Uuid,
        document_id -> Uuid,
        assignee_id -> Uuid,
        page -> Int4,
        x -> Float8,
        y -> Float8,
        width -> Float8,
        height -> Float8,
        field_name -> Varchar,
        signed -> Bool,
        created_at -> Timestamp,
        signed_at -> Nullable<Timestamp>,
    }
}

diesel::joinable!(signature_images -> users (user_id));
diesel::joinable!(documents -> users (owner_id));
diesel::joinable!(signature_fields -> documents (document_id));
diesel::joinable!(signature_fields -> users (assignee_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    signature_images,
    documents,
    signature_fields,
);
