//! Client-to-server commands.
//!
//! Commands have fixed layouts known to both sides, so they are written and
//! read in one pass without descriptors.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::error::{Error, Result};

/// Client-to-server command tags
#[repr(i16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandType {
    IdentHeadset = 0,
    HeadsetUpdate = 1,
    AnchoringDataSegment = 2,
    AnchoringDataStatus = 3,
    RequestSubDatasetLock = 4,
}

impl CommandType {
    pub fn from_i16(val: i16) -> Option<Self> {
        match val {
            0 => Some(CommandType::IdentHeadset),
            1 => Some(CommandType::HeadsetUpdate),
            2 => Some(CommandType::AnchoringDataSegment),
            3 => Some(CommandType::AnchoringDataStatus),
            4 => Some(CommandType::RequestSubDatasetLock),
            _ => None,
        }
    }
}

/// Headset pose plus the state of its current pointing interaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadsetUpdate {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub pointing_technique: i32,
    pub pointing_dataset_id: i32,
    pub pointing_subdataset_id: i32,
    pub pointing_in_public: bool,
    pub pointing_local_position: [f32; 3],
    pub pointing_headset_start_position: [f32; 3],
    pub pointing_headset_start_orientation: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    IdentHeadset,
    HeadsetUpdate(HeadsetUpdate),
    AnchoringDataSegment(Vec<u8>),
    AnchoringDataStatus { succeeded: bool },
    RequestSubDatasetLock { dataset_id: i32, subdataset_id: i32 },
}

fn write_floats(buf: &mut Vec<u8>, values: &[f32]) -> Result<()> {
    for &v in values {
        buf.write_f32::<BigEndian>(v)?;
    }
    Ok(())
}

fn read_floats<const N: usize>(cursor: &mut Cursor<&[u8]>) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for v in out.iter_mut() {
        *v = cursor.read_f32::<BigEndian>()?;
    }
    Ok(out)
}

impl Command {
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::IdentHeadset => CommandType::IdentHeadset,
            Command::HeadsetUpdate(_) => CommandType::HeadsetUpdate,
            Command::AnchoringDataSegment(_) => CommandType::AnchoringDataSegment,
            Command::AnchoringDataStatus { .. } => CommandType::AnchoringDataStatus,
            Command::RequestSubDatasetLock { .. } => CommandType::RequestSubDatasetLock,
        }
    }

    /// Encode command to bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_i16::<BigEndian>(self.command_type() as i16)?;

        match self {
            Command::IdentHeadset => {}
            Command::HeadsetUpdate(u) => {
                write_floats(&mut buf, &u.position)?;
                write_floats(&mut buf, &u.rotation)?;
                buf.write_i32::<BigEndian>(u.pointing_technique)?;
                buf.write_i32::<BigEndian>(u.pointing_dataset_id)?;
                buf.write_i32::<BigEndian>(u.pointing_subdataset_id)?;
                buf.write_u8(u.pointing_in_public as u8)?;
                write_floats(&mut buf, &u.pointing_local_position)?;
                write_floats(&mut buf, &u.pointing_headset_start_position)?;
                write_floats(&mut buf, &u.pointing_headset_start_orientation)?;
            }
            Command::AnchoringDataSegment(data) => {
                buf.write_i32::<BigEndian>(data.len() as i32)?;
                buf.extend_from_slice(data);
            }
            Command::AnchoringDataStatus { succeeded } => {
                buf.write_u8(*succeeded as u8)?;
            }
            Command::RequestSubDatasetLock {
                dataset_id,
                subdataset_id,
            } => {
                buf.write_i32::<BigEndian>(*dataset_id)?;
                buf.write_i32::<BigEndian>(*subdataset_id)?;
            }
        }

        Ok(buf)
    }

    /// Decode a command from bytes, using the same layouts as `encode`
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let tag = cursor.read_i16::<BigEndian>()?;
        let ty = CommandType::from_i16(tag).ok_or(Error::UnknownMessageType(tag))?;

        Ok(match ty {
            CommandType::IdentHeadset => Command::IdentHeadset,
            CommandType::HeadsetUpdate => Command::HeadsetUpdate(HeadsetUpdate {
                position: read_floats(&mut cursor)?,
                rotation: read_floats(&mut cursor)?,
                pointing_technique: cursor.read_i32::<BigEndian>()?,
                pointing_dataset_id: cursor.read_i32::<BigEndian>()?,
                pointing_subdataset_id: cursor.read_i32::<BigEndian>()?,
                pointing_in_public: cursor.read_u8()? != 0,
                pointing_local_position: read_floats(&mut cursor)?,
                pointing_headset_start_position: read_floats(&mut cursor)?,
                pointing_headset_start_orientation: read_floats(&mut cursor)?,
            }),
            CommandType::AnchoringDataSegment => {
                let len = cursor.read_i32::<BigEndian>()?;
                if len < 0 {
                    return Err(Error::InvalidLength(len));
                }
                let mut payload = vec![0u8; len as usize];
                cursor.read_exact(&mut payload)?;
                Command::AnchoringDataSegment(payload)
            }
            CommandType::AnchoringDataStatus => Command::AnchoringDataStatus {
                succeeded: cursor.read_u8()? != 0,
            },
            CommandType::RequestSubDatasetLock => Command::RequestSubDatasetLock {
                dataset_id: cursor.read_i32::<BigEndian>()?,
                subdataset_id: cursor.read_i32::<BigEndian>()?,
            },
        })
    }
}
