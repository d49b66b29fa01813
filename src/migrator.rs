use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240101_000001_create_order_lifecycle_tables::Migration)]
    }
}

mod m20240101_000001_create_order_lifecycle_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_order_lifecycle_tables"
        }
    }

    fn money(col: impl IntoIden) -> ColumnDef {
        ColumnDef::new(col)
            .decimal_len(19, 4)
            .not_null()
            .default(0)
            .to_owned()
    }

    fn id_column(col: impl IntoIden) -> ColumnDef {
        ColumnDef::new(col)
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned()
    }

    fn order_fk(name: &str, table: impl IntoIden + 'static, column: impl IntoIden + 'static) -> ForeignKeyCreateStatement {
        ForeignKey::create()
            .name(name)
            .from(table, column)
            .to(Orders::Table, Orders::Id)
            .on_delete(ForeignKeyAction::Cascade)
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(id_column(Orders::Id))
                        .col(ColumnDef::new(Orders::Email).string().null())
                        .col(ColumnDef::new(Orders::CustomerId).string().null())
                        .col(ColumnDef::new(Orders::RegionId).string().null())
                        .col(ColumnDef::new(Orders::SalesChannelId).string().null())
                        .col(ColumnDef::new(Orders::CurrencyCode).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Orders::FulfillmentStatus)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(money(Orders::ItemTotal))
                        .col(money(Orders::ShippingTotal))
                        .col(money(Orders::TaxTotal))
                        .col(money(Orders::DiscountTotal))
                        .col(money(Orders::Total))
                        .col(ColumnDef::new(Orders::Metadata).json().not_null())
                        .col(ColumnDef::new(Orders::Version).integer().not_null().default(1))
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::CanceledAt).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Orders::CompletedAt).timestamp_with_time_zone().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(id_column(OrderItems::Id))
                        .col(ColumnDef::new(OrderItems::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(OrderItems::Title).string().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).string().null())
                        .col(ColumnDef::new(OrderItems::ProductId).string().null())
                        .col(money(OrderItems::UnitPrice))
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::FulfilledQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(money(OrderItems::TaxTotal))
                        .col(money(OrderItems::DiscountTotal))
                        .col(ColumnDef::new(OrderItems::Metadata).json().not_null())
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut order_fk(
                            "fk_order_items_order_id",
                            OrderItems::Table,
                            OrderItems::OrderId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShippingMethods::Table)
                        .if_not_exists()
                        .col(id_column(ShippingMethods::Id))
                        .col(ColumnDef::new(ShippingMethods::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(ShippingMethods::Name).string().not_null())
                        .col(ColumnDef::new(ShippingMethods::ShippingOptionId).string().null())
                        .col(money(ShippingMethods::Amount))
                        .col(ColumnDef::new(ShippingMethods::Metadata).json().not_null())
                        .col(
                            ColumnDef::new(ShippingMethods::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShippingMethods::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut order_fk(
                            "fk_shipping_methods_order_id",
                            ShippingMethods::Table,
                            ShippingMethods::OrderId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PaymentCollections::Table)
                        .if_not_exists()
                        .col(id_column(PaymentCollections::Id))
                        .col(
                            ColumnDef::new(PaymentCollections::OrderId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentCollections::CurrencyCode)
                                .string_len(3)
                                .not_null(),
                        )
                        .col(money(PaymentCollections::Amount))
                        .col(money(PaymentCollections::AuthorizedAmount))
                        .col(money(PaymentCollections::CapturedAmount))
                        .col(money(PaymentCollections::RefundedAmount))
                        .col(
                            ColumnDef::new(PaymentCollections::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentCollections::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentCollections::Metadata).json().not_null())
                        .col(
                            ColumnDef::new(PaymentCollections::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentCollections::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut order_fk(
                            "fk_payment_collections_order_id",
                            PaymentCollections::Table,
                            PaymentCollections::OrderId,
                        ))
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderChanges::Table)
                        .if_not_exists()
                        .col(id_column(OrderChanges::Id))
                        .col(ColumnDef::new(OrderChanges::OrderId).big_integer().not_null())
                        .col(ColumnDef::new(OrderChanges::Version).integer().not_null())
                        .col(ColumnDef::new(OrderChanges::Status).string_len(32).not_null())
                        .col(ColumnDef::new(OrderChanges::RequestedBy).string().not_null())
                        .col(
                            ColumnDef::new(OrderChanges::RequestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderChanges::ConfirmedBy).string().not_null())
                        .col(
                            ColumnDef::new(OrderChanges::ConfirmedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderChanges::Metadata).json().not_null())
                        .col(
                            ColumnDef::new(OrderChanges::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderChanges::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(&mut order_fk(
                            "fk_order_changes_order_id",
                            OrderChanges::Table,
                            OrderChanges::OrderId,
                        ))
                        .to_owned(),
                )
                .await?;

            for (name, table, column) in [
                ("idx_order_items_order_id", OrderItems::Table.into_iden(), OrderItems::OrderId.into_iden()),
                (
                    "idx_shipping_methods_order_id",
                    ShippingMethods::Table.into_iden(),
                    ShippingMethods::OrderId.into_iden(),
                ),
                (
                    "idx_payment_collections_order_id",
                    PaymentCollections::Table.into_iden(),
                    PaymentCollections::OrderId.into_iden(),
                ),
                (
                    "idx_order_changes_order_id",
                    OrderChanges::Table.into_iden(),
                    OrderChanges::OrderId.into_iden(),
                ),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderChanges::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PaymentCollections::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ShippingMethods::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        Email,
        CustomerId,
        RegionId,
        SalesChannelId,
        CurrencyCode,
        Status,
        PaymentStatus,
        FulfillmentStatus,
        ItemTotal,
        ShippingTotal,
        TaxTotal,
        DiscountTotal,
        Total,
        Metadata,
        Version,
        CreatedAt,
        UpdatedAt,
        CanceledAt,
        CompletedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        Title,
        VariantId,
        ProductId,
        UnitPrice,
        Quantity,
        FulfilledQuantity,
        TaxTotal,
        DiscountTotal,
        Metadata,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ShippingMethods {
        Table,
        Id,
        OrderId,
        Name,
        ShippingOptionId,
        Amount,
        Metadata,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PaymentCollections {
        Table,
        Id,
        OrderId,
        CurrencyCode,
        Amount,
        AuthorizedAmount,
        CapturedAmount,
        RefundedAmount,
        Status,
        CompletedAt,
        Metadata,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderChanges {
        Table,
        Id,
        OrderId,
        Version,
        Status,
        RequestedBy,
        RequestedAt,
        ConfirmedBy,
        ConfirmedAt,
        Metadata,
        CreatedAt,
        UpdatedAt,
    }
}
