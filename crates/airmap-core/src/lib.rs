pub mod models;
pub mod packet;
pub mod proto;

pub use models::{
    trajectory, AirspaceRestriction, CircularRestriction, Coordinate, GlobalPosition, GpsRaw,
    MissionCommand, MissionItem, PolygonRestriction, RestrictionSet,
};
pub use packet::{
    decode_records, encode_payload, open_datagram, pad_payload, padding_len, seal_datagram,
    MessageType, OpenedDatagram, PacketError, SessionKey, IV_LEN, KEY_LEN,
};
pub use proto::{Position, Speed};
