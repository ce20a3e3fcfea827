mod catalog_file;
mod multi_peer_rounds;
mod pin_retention_flow;
mod sequence_restart;
