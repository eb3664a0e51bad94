pub mod playlist_generate;
