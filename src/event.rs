// VHOSTPIN KERNEL EVENT DECODING
// RAW RING BUFFER RECORDS -> TRIGGERS. LAYOUT MATCHES src/bpf/intf.h.
//
// ioctl_events:   u32 IOCTL COMMAND. _IO(VHOST_VIRTIO, 0x01) = 0xAF01,
//                 SO BYTE 0 IS THE NR AND BYTE 1 THE TYPE.
// kthread_events: u32 PID, LITTLE-ENDIAN.

// include/uapi/linux/vhost.h
pub const VHOST_VIRTIO: u8 = 0xAF;
pub const VHOST_SET_OWNER: u8 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    // A vhost DEVICE GOT AN OWNER: ITS WORKER EXISTS SOON, PID UNKNOWN
    Sweep,
    // A vhost-* THREAD WAS JUST CREATED
    Pin(u32),
}

pub fn decode_ioctl(data: &[u8]) -> Option<Trigger> {
    match data {
        [nr, ty, ..] if *ty == VHOST_VIRTIO && *nr == VHOST_SET_OWNER => Some(Trigger::Sweep),
        _ => None,
    }
}

pub fn decode_kthread(data: &[u8]) -> Option<Trigger> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some(Trigger::Pin(u32::from_le_bytes(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_owner_triggers_sweep() {
        let cmd: u32 = (VHOST_VIRTIO as u32) << 8 | VHOST_SET_OWNER as u32;
        assert_eq!(decode_ioctl(&cmd.to_le_bytes()), Some(Trigger::Sweep));
        assert_eq!(decode_ioctl(&[0x01, 0xAF, 0, 0]), Some(Trigger::Sweep));
    }

    #[test]
    fn other_vhost_ioctls_are_ignored() {
        // VHOST_RESET_OWNER, VHOST_SET_MEM_TABLE
        assert_eq!(decode_ioctl(&[0x02, 0xAF, 0, 0]), None);
        assert_eq!(decode_ioctl(&[0x03, 0xAF, 0x28, 0x40]), None);
        // SAME NR, FOREIGN TYPE
        assert_eq!(decode_ioctl(&[0x01, 0x54, 0, 0]), None);
    }

    #[test]
    fn short_ioctl_record_is_ignored() {
        assert_eq!(decode_ioctl(&[]), None);
        assert_eq!(decode_ioctl(&[0x01]), None);
    }

    #[test]
    fn kthread_pid_is_little_endian() {
        assert_eq!(decode_kthread(&[0x39, 0x30, 0, 0]), Some(Trigger::Pin(12345)));
        assert_eq!(decode_kthread(&4_194_304u32.to_le_bytes()), Some(Trigger::Pin(4_194_304)));
    }

    #[test]
    fn kthread_padding_is_ignored() {
        assert_eq!(decode_kthread(&[7, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]), Some(Trigger::Pin(7)));
    }

    #[test]
    fn short_kthread_record_is_ignored() {
        assert_eq!(decode_kthread(&[0x39, 0x30, 0]), None);
    }
}
