use sea_orm_migration::prelude::*;

use crate::m20250101_000001_create_user_tables::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create playlists table
        manager
            .create_table(
                Table::create()
                    .table(Playlists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Playlists::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Playlists::UserId).string().not_null())
                    .col(ColumnDef::new(Playlists::Name).string().not_null())
                    .col(ColumnDef::new(Playlists::Description).string())
                    .col(ColumnDef::new(Playlists::Prompt).string())
                    .col(ColumnDef::new(Playlists::Mood).string())
                    .col(
                        ColumnDef::new(Playlists::IsPublic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Playlists::CoverUrl).string())
                    .col(ColumnDef::new(Playlists::SpotifyId).string())
                    .col(
                        ColumnDef::new(Playlists::SongCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Playlists::TotalDuration)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Playlists::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(Playlists::UpdatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlists_user_id")
                            .from(Playlists::Table, Playlists::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_playlists_user_id")
                    .table(Playlists::Table)
                    .col(Playlists::UserId)
                    .to_owned(),
            )
            .await?;

        // Create songs table
        manager
            .create_table(
                Table::create()
                    .table(Songs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Songs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Songs::PlaylistId).big_integer().not_null())
                    .col(ColumnDef::new(Songs::Title).string().not_null())
                    .col(ColumnDef::new(Songs::Artist).string().not_null())
                    .col(ColumnDef::new(Songs::Album).string())
                    .col(
                        ColumnDef::new(Songs::Duration)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Songs::Year).integer())
                    .col(ColumnDef::new(Songs::Bpm).integer())
                    .col(ColumnDef::new(Songs::Key).string())
                    .col(ColumnDef::new(Songs::SpotifyId).string())
                    .col(ColumnDef::new(Songs::YoutubeId).string())
                    .col(ColumnDef::new(Songs::PreviewUrl).string())
                    .col(ColumnDef::new(Songs::CreatedAt).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_songs_playlist_id")
                            .from(Songs::Table, Songs::PlaylistId)
                            .to(Playlists::Table, Playlists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_songs_playlist_id")
                    .table(Songs::Table)
                    .col(Songs::PlaylistId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop tables in reverse order
        manager
            .drop_table(Table::drop().table(Songs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Playlists::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Playlists {
    Table,
    Id,
    UserId,
    Name,
    Description,
    Prompt,
    Mood,
    IsPublic,
    CoverUrl,
    SpotifyId,
    SongCount,
    TotalDuration,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Songs {
    Table,
    Id,
    PlaylistId,
    Title,
    Artist,
    Album,
    Duration,
    Year,
    Bpm,
    Key,
    SpotifyId,
    YoutubeId,
    PreviewUrl,
    CreatedAt,
}
