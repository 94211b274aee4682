table! {
    addresses (id) {
        id -> Int8,
        address -> Varchar,
    }
}

table! {
    transactions (id) {
        id -> Int8,
        block_number -> Int8,
        time_stamp -> Timestamptz,
        hash -> Varchar,
        from_address_id -> Int8,
        to_address_id -> Int8,
        value -> Numeric,
        gas -> Int8,
        gas_used -> Int8,
        is_error -> Bool,
    }
}

allow_tables_to_appear_in_same_query!(addresses, transactions);
