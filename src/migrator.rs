use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_tours_table::Migration),
            Box::new(m20250101_000002_create_bookings_table::Migration),
            Box::new(m20250101_000003_create_payments_table::Migration),
            Box::new(m20250101_000004_create_invoices_table::Migration),
        ]
    }
}

mod m20250101_000001_create_tours_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_tours_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Tours::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Tours::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Tours::Name).string().not_null())
                        .col(ColumnDef::new(Tours::Description).string().null())
                        .col(ColumnDef::new(Tours::Price).decimal().not_null())
                        .col(ColumnDef::new(Tours::PriceSol).decimal().not_null())
                        .col(ColumnDef::new(Tours::PriceBtc).decimal().not_null())
                        .col(ColumnDef::new(Tours::PriceEth).decimal().not_null())
                        .col(ColumnDef::new(Tours::Duration).string().null())
                        .col(ColumnDef::new(Tours::Location).string().null())
                        .col(ColumnDef::new(Tours::ImageUrl).string().null())
                        .col(ColumnDef::new(Tours::Capacity).integer().null())
                        .col(ColumnDef::new(Tours::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Tours::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Tours::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Tours {
        Table,
        Id,
        Name,
        Description,
        Price,
        PriceSol,
        PriceBtc,
        PriceEth,
        Duration,
        Location,
        ImageUrl,
        Capacity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000002_create_bookings_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_bookings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Bookings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bookings::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bookings::TourId).uuid().not_null())
                        .col(ColumnDef::new(Bookings::UserId).uuid().null())
                        .col(ColumnDef::new(Bookings::CustomerEmail).string().null())
                        .col(ColumnDef::new(Bookings::BookingDate).timestamp().not_null())
                        .col(ColumnDef::new(Bookings::Status).string().not_null())
                        .col(ColumnDef::new(Bookings::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Bookings::UpdatedAt).timestamp().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bookings_tour")
                                .from(Bookings::Table, Bookings::TourId)
                                .to(
                                    super::m20250101_000001_create_tours_table::Tours::Table,
                                    super::m20250101_000001_create_tours_table::Tours::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bookings_tour_status")
                        .table(Bookings::Table)
                        .col(Bookings::TourId)
                        .col(Bookings::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bookings::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Bookings {
        Table,
        Id,
        TourId,
        UserId,
        CustomerEmail,
        BookingDate,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000003_create_payments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::BookingId).uuid().not_null())
                        .col(ColumnDef::new(Payments::Amount).decimal().not_null())
                        .col(ColumnDef::new(Payments::Method).string().not_null())
                        .col(ColumnDef::new(Payments::Handle).string().null())
                        .col(ColumnDef::new(Payments::ExternalTxId).string().null())
                        .col(ColumnDef::new(Payments::Status).string().not_null())
                        .col(ColumnDef::new(Payments::FailureReason).string().null())
                        .col(ColumnDef::new(Payments::ExpiresAt).timestamp().null())
                        .col(
                            ColumnDef::new(Payments::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Payments::UpdatedAt).timestamp().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_booking")
                                .from(Payments::Table, Payments::BookingId)
                                .to(
                                    super::m20250101_000002_create_bookings_table::Bookings::Table,
                                    super::m20250101_000002_create_bookings_table::Bookings::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_status_expires")
                        .table(Payments::Table)
                        .col(Payments::Status)
                        .col(Payments::ExpiresAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Payments {
        Table,
        Id,
        BookingId,
        Amount,
        Method,
        Handle,
        ExternalTxId,
        Status,
        FailureReason,
        ExpiresAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250101_000004_create_invoices_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Invoices::PaymentId).uuid().not_null())
                        .col(
                            ColumnDef::new(Invoices::InvoiceNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Invoices::Amount).decimal().not_null())
                        .col(ColumnDef::new(Invoices::Currency).string().not_null())
                        .col(ColumnDef::new(Invoices::Status).string().not_null())
                        .col(ColumnDef::new(Invoices::CreatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_payment")
                                .from(Invoices::Table, Invoices::PaymentId)
                                .to(
                                    super::m20250101_000003_create_payments_table::Payments::Table,
                                    super::m20250101_000003_create_payments_table::Payments::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Invoices {
        Table,
        Id,
        PaymentId,
        InvoiceNumber,
        Amount,
        Currency,
        Status,
        CreatedAt,
    }
}
