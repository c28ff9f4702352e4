use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_bills_table::Migration),
            Box::new(m20250601_000002_create_bill_items_table::Migration),
        ]
    }
}

mod m20250601_000001_create_bills_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000001_create_bills_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::bill Model
            manager
                .create_table(
                    Table::create()
                        .table(Bills::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bills::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bills::UserId).string().not_null())
                        .col(ColumnDef::new(Bills::FileKey).string().not_null())
                        .col(ColumnDef::new(Bills::FileUrl).string().not_null())
                        .col(ColumnDef::new(Bills::FileName).string().not_null())
                        .col(ColumnDef::new(Bills::ContentType).string_len(100).not_null())
                        .col(
                            ColumnDef::new(Bills::InvoiceNumber)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Bills::InvoiceDate).date().not_null())
                        .col(ColumnDef::new(Bills::SellerName).string().not_null().default(""))
                        .col(ColumnDef::new(Bills::SellerAddress).text().not_null().default(""))
                        .col(
                            ColumnDef::new(Bills::SellerGstin)
                                .string_len(15)
                                .not_null()
                                .default(""),
                        )
                        .col(ColumnDef::new(Bills::BuyerName).string().not_null().default(""))
                        .col(ColumnDef::new(Bills::BuyerAddress).text().not_null().default(""))
                        .col(
                            ColumnDef::new(Bills::BuyerGstin)
                                .string_len(15)
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(Bills::TotalAmount)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Bills::GstAmount)
                                .decimal_len(14, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Bills::TransactionType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bills::Category)
                                .string()
                                .not_null()
                                .default("uncategorized"),
                        )
                        .col(
                            ColumnDef::new(Bills::Status)
                                .string_len(20)
                                .not_null()
                                .default("processed"),
                        )
                        .col(ColumnDef::new(Bills::RawData).json().not_null())
                        .col(
                            ColumnDef::new(Bills::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bills::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bills_user_id")
                        .table(Bills::Table)
                        .col(Bills::UserId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bills_created_at")
                        .table(Bills::Table)
                        .col(Bills::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bills::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Bills {
        Table,
        Id,
        UserId,
        FileKey,
        FileUrl,
        FileName,
        ContentType,
        InvoiceNumber,
        InvoiceDate,
        SellerName,
        SellerAddress,
        SellerGstin,
        BuyerName,
        BuyerAddress,
        BuyerGstin,
        TotalAmount,
        GstAmount,
        TransactionType,
        Category,
        Status,
        RawData,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250601_000002_create_bill_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000002_create_bill_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::bill_item Model
            manager
                .create_table(
                    Table::create()
                        .table(BillItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BillItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(BillItems::BillId).uuid().not_null())
                        .col(
                            ColumnDef::new(BillItems::Description)
                                .text()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(BillItems::Quantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BillItems::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BillItems::Amount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BillItems::GstRate)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(BillItems::Category)
                                .string()
                                .not_null()
                                .default("uncategorized"),
                        )
                        .col(
                            ColumnDef::new(BillItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bill_items_bill_id")
                                .from(BillItems::Table, BillItems::BillId)
                                .to(Bills::Table, Bills::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_bill_items_bill_id")
                        .table(BillItems::Table)
                        .col(BillItems::BillId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BillItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BillItems {
        Table,
        Id,
        BillId,
        Description,
        Quantity,
        UnitPrice,
        Amount,
        GstRate,
        Category,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Bills {
        Table,
        Id,
    }
}
