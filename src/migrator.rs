use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_stock_records_table::Migration),
            Box::new(m20240101_000002_create_stock_movements_table::Migration),
            Box::new(m20240101_000003_create_stock_reservations_table::Migration),
            Box::new(m20240101_000004_create_transfers_tables::Migration),
            Box::new(m20240101_000005_create_delegated_stocks_tables::Migration),
            Box::new(m20240101_000006_create_reconciliations_table::Migration),
            Box::new(m20240101_000007_create_cash_movements_table::Migration),
        ]
    }
}

mod m20240101_000001_create_stock_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_stock_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRecords::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::WarehouseId).uuid().not_null())
                        .col(ColumnDef::new(StockRecords::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockRecords::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::Reserved)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::Available)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::CostAverage)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UnitCost)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockRecords::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockRecords::LastCountedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(StockRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_stock_records_tenant_warehouse_product")
                        .table(StockRecords::Table)
                        .col(StockRecords::TenantId)
                        .col(StockRecords::WarehouseId)
                        .col(StockRecords::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockRecords {
        Table,
        Id,
        TenantId,
        WarehouseId,
        ProductId,
        Quantity,
        Reserved,
        Available,
        CostAverage,
        UnitCost,
        Version,
        LastCountedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::TenantId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::FromWarehouseId).uuid())
                        .col(ColumnDef::new(StockMovements::ToWarehouseId).uuid())
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(StockMovements::UnitCost)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockMovements::Reference).string().not_null())
                        .col(ColumnDef::new(StockMovements::Actor).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::Notes).text())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_stock_movements_tenant_product_time")
                        .table(StockMovements::Table)
                        .col(StockMovements::TenantId)
                        .col(StockMovements::ProductId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_stock_movements_reference")
                        .table(StockMovements::Table)
                        .col(StockMovements::Reference)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        TenantId,
        ProductId,
        FromWarehouseId,
        ToWarehouseId,
        MovementType,
        Quantity,
        UnitCost,
        Reference,
        Actor,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000003_create_stock_reservations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_reservations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockReservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockReservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockReservations::TenantId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockReservations::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReservations::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReservations::Reference)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReservations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReservations::QuantityRequested)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockReservations::Status).string().not_null())
                        .col(
                            ColumnDef::new(StockReservations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockReservations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_stock_reservations_key_reference")
                        .table(StockReservations::Table)
                        .col(StockReservations::TenantId)
                        .col(StockReservations::ProductId)
                        .col(StockReservations::WarehouseId)
                        .col(StockReservations::Reference)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockReservations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockReservations {
        Table,
        Id,
        TenantId,
        ProductId,
        WarehouseId,
        Reference,
        Quantity,
        QuantityRequested,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_transfers_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_transfers_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transfers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Transfers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Transfers::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Transfers::Reference).string().not_null())
                        .col(ColumnDef::new(Transfers::FromWarehouseId).uuid().not_null())
                        .col(ColumnDef::new(Transfers::ToWarehouseId).uuid().not_null())
                        .col(ColumnDef::new(Transfers::Status).string().not_null())
                        .col(ColumnDef::new(Transfers::RequestedBy).uuid().not_null())
                        .col(ColumnDef::new(Transfers::ApprovedBy).uuid())
                        .col(
                            ColumnDef::new(Transfers::RequestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transfers::ApprovedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Transfers::ExecutedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Transfers::ReceivedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Transfers::Notes).text())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_transfers_tenant_reference")
                        .table(Transfers::Table)
                        .col(Transfers::TenantId)
                        .col(Transfers::Reference)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(TransferLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransferLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferLines::TransferId).uuid().not_null())
                        .col(ColumnDef::new(TransferLines::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(TransferLines::QuantityRequested)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferLines::QuantityApproved).integer())
                        .col(ColumnDef::new(TransferLines::QuantityReceived).integer())
                        .col(
                            ColumnDef::new(TransferLines::UnitCost)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_transfer_lines_transfer")
                        .table(TransferLines::Table)
                        .col(TransferLines::TransferId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransferLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Transfers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transfers {
        Table,
        Id,
        TenantId,
        Reference,
        FromWarehouseId,
        ToWarehouseId,
        Status,
        RequestedBy,
        ApprovedBy,
        RequestedAt,
        ApprovedAt,
        ExecutedAt,
        ReceivedAt,
        Notes,
    }

    #[derive(DeriveIden)]
    enum TransferLines {
        Table,
        Id,
        TransferId,
        ProductId,
        QuantityRequested,
        QuantityApproved,
        QuantityReceived,
        UnitCost,
    }
}

mod m20240101_000005_create_delegated_stocks_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_delegated_stocks_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DelegatedStocks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DelegatedStocks::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DelegatedStocks::TenantId).uuid().not_null())
                        .col(ColumnDef::new(DelegatedStocks::ServerId).uuid().not_null())
                        .col(ColumnDef::new(DelegatedStocks::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(DelegatedStocks::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::BatchReference)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DelegatedStocks::DelegatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(DelegatedStocks::QuantityDelegated)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::QuantityRemaining)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::QuantitySold)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::QuantityReturned)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::QuantityLost)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::UnitCost)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::TotalSalesAmount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(DelegatedStocks::Status).string().not_null())
                        .col(
                            ColumnDef::new(DelegatedStocks::Version)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStocks::DelegatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DelegatedStocks::ReconciledAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(DelegatedStocks::SettledAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(DelegatedStocks::Notes).text())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_delegated_stocks_tenant_server_status")
                        .table(DelegatedStocks::Table)
                        .col(DelegatedStocks::TenantId)
                        .col(DelegatedStocks::ServerId)
                        .col(DelegatedStocks::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DelegatedStockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DelegatedStockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::TenantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::DelegatedStockId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::ServerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::QuantityBefore)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::QuantityAfter)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DelegatedStockMovements::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(DelegatedStockMovements::Reference).string())
                        .col(
                            ColumnDef::new(DelegatedStockMovements::PerformedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DelegatedStockMovements::Notes).text())
                        .col(
                            ColumnDef::new(DelegatedStockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_delegated_stock_movements_row_time")
                        .table(DelegatedStockMovements::Table)
                        .col(DelegatedStockMovements::DelegatedStockId)
                        .col(DelegatedStockMovements::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(DelegatedStockMovements::Table)
                        .to_owned(),
                )
                .await?;
            manager
                .drop_table(Table::drop().table(DelegatedStocks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DelegatedStocks {
        Table,
        Id,
        TenantId,
        ServerId,
        ProductId,
        WarehouseId,
        BatchReference,
        DelegatedBy,
        QuantityDelegated,
        QuantityRemaining,
        QuantitySold,
        QuantityReturned,
        QuantityLost,
        UnitPrice,
        UnitCost,
        TotalSalesAmount,
        Status,
        Version,
        DelegatedAt,
        ReconciledAt,
        SettledAt,
        Notes,
    }

    #[derive(DeriveIden)]
    enum DelegatedStockMovements {
        Table,
        Id,
        TenantId,
        DelegatedStockId,
        ServerId,
        ProductId,
        MovementType,
        Quantity,
        QuantityBefore,
        QuantityAfter,
        UnitPrice,
        TotalAmount,
        Reference,
        PerformedBy,
        Notes,
        CreatedAt,
    }
}

mod m20240101_000006_create_reconciliations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_reconciliations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Reconciliations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Reconciliations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reconciliations::TenantId).uuid().not_null())
                        .col(ColumnDef::new(Reconciliations::ServerId).uuid().not_null())
                        .col(ColumnDef::new(Reconciliations::ManagerId).uuid())
                        .col(ColumnDef::new(Reconciliations::Reference).string().not_null())
                        .col(
                            ColumnDef::new(Reconciliations::SessionStart)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Reconciliations::SessionEnd).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(Reconciliations::TotalDelegatedValue)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::TotalSales)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::TotalReturnedValue)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::TotalLossesValue)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::CashExpected)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::CashCollected)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::CashDifference)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Reconciliations::Status).string().not_null())
                        .col(ColumnDef::new(Reconciliations::ServerNotes).text())
                        .col(ColumnDef::new(Reconciliations::ManagerNotes).text())
                        .col(
                            ColumnDef::new(Reconciliations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Reconciliations::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_reconciliations_tenant_reference")
                        .table(Reconciliations::Table)
                        .col(Reconciliations::TenantId)
                        .col(Reconciliations::Reference)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_reconciliations_tenant_server_status")
                        .table(Reconciliations::Table)
                        .col(Reconciliations::TenantId)
                        .col(Reconciliations::ServerId)
                        .col(Reconciliations::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Reconciliations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Reconciliations {
        Table,
        Id,
        TenantId,
        ServerId,
        ManagerId,
        Reference,
        SessionStart,
        SessionEnd,
        TotalDelegatedValue,
        TotalSales,
        TotalReturnedValue,
        TotalLossesValue,
        CashExpected,
        CashCollected,
        CashDifference,
        Status,
        ServerNotes,
        ManagerNotes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000007_create_cash_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_cash_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CashMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CashMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CashMovements::TenantId).uuid().not_null())
                        .col(ColumnDef::new(CashMovements::Direction).string().not_null())
                        .col(ColumnDef::new(CashMovements::Category).string().not_null())
                        .col(
                            ColumnDef::new(CashMovements::Amount)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CashMovements::Reference).string().not_null())
                        .col(ColumnDef::new(CashMovements::RecordedBy).uuid().not_null())
                        .col(ColumnDef::new(CashMovements::ReconciliationId).uuid())
                        .col(
                            ColumnDef::new(CashMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ix_cash_movements_tenant_time")
                        .table(CashMovements::Table)
                        .col(CashMovements::TenantId)
                        .col(CashMovements::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CashMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum CashMovements {
        Table,
        Id,
        TenantId,
        Direction,
        Category,
        Amount,
        Reference,
        RecordedBy,
        ReconciliationId,
        CreatedAt,
    }
}
