use kring::ffi::*;
use std::ffi::CString;
use std::ptr;

#[test]
fn test_ffi_write_and_read() {
    let registry = kring_registry_new();
    let name = CString::new("ffi_plain").unwrap();
    assert_eq!(
        kring_create(registry, name.as_ptr(), 1, 64, 256, 2, 2, KRING_HOST_IN_PROCESS),
        KRING_SUCCESS
    );

    let mut writer = ptr::null_mut();
    let mut reader = ptr::null_mut();
    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_WRITE, &mut writer), KRING_SUCCESS);
    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_READ, &mut reader), KRING_SUCCESS);

    assert_eq!(kring_avail(reader), 0);
    let msg = b"hello over ffi";
    assert_eq!(kring_write_plain(writer, msg.as_ptr(), msg.len()), msg.len() as i64);
    assert_eq!(kring_avail(reader), 1);

    let mut buf = [0u8; 64];
    let mut len = buf.len();
    assert_eq!(kring_next_plain(reader, buf.as_mut_ptr(), &mut len), KRING_SUCCESS);
    assert_eq!(&buf[..len], msg);

    len = buf.len();
    assert_eq!(kring_next_plain(reader, buf.as_mut_ptr(), &mut len), KRING_ERROR_EMPTY);

    let mut skips = u64::MAX;
    assert_eq!(kring_skips(reader, &mut skips), KRING_SUCCESS);
    assert_eq!(skips, 0);

    // Tearing down with bound handles is refused.
    assert_eq!(kring_teardown(registry, name.as_ptr()), KRING_ERROR_BUSY);

    kring_close(writer);
    kring_close(reader);
    assert_eq!(kring_teardown(registry, name.as_ptr()), KRING_SUCCESS);
    kring_registry_free(registry);
}

#[test]
fn test_ffi_small_buffer_keeps_message() {
    let registry = kring_registry_new();
    let name = CString::new("ffi_small").unwrap();
    assert_eq!(
        kring_create(registry, name.as_ptr(), 1, 16, 256, 1, 1, KRING_HOST_IN_PROCESS),
        KRING_SUCCESS
    );
    let mut writer = ptr::null_mut();
    let mut reader = ptr::null_mut();
    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_WRITE, &mut writer), KRING_SUCCESS);
    assert_eq!(kring_open(registry, name.as_ptr(), -1, KRING_MODE_READ, &mut reader), KRING_SUCCESS);

    let msg = [7u8; 100];
    kring_write_plain(writer, msg.as_ptr(), msg.len());

    let mut small = [0u8; 10];
    let mut len = small.len();
    assert_eq!(kring_next_plain(reader, small.as_mut_ptr(), &mut len), KRING_ERROR_INVALID_ARG);
    assert_eq!(len, 100);

    let mut big = [0u8; 128];
    len = big.len();
    assert_eq!(kring_next_plain(reader, big.as_mut_ptr(), &mut len), KRING_SUCCESS);
    assert_eq!(&big[..len], &msg[..]);

    kring_close(writer);
    kring_close(reader);
    kring_registry_free(registry);
}

#[test]
fn test_ffi_errors() {
    let registry = kring_registry_new();
    let name = CString::new("ffi_errors").unwrap();
    let missing = CString::new("ffi_missing").unwrap();
    let bad = CString::new("bad/name").unwrap();

    assert_eq!(kring_create(registry, bad.as_ptr(), 1, 16, 256, 1, 1, KRING_HOST_IN_PROCESS), KRING_ERROR_BAD_NAME);
    assert_eq!(kring_create(registry, name.as_ptr(), 1, 15, 256, 1, 1, KRING_HOST_IN_PROCESS), KRING_ERROR_INVALID_CONFIG);
    assert_eq!(kring_create(registry, name.as_ptr(), 1, 16, 256, 1, 1, 7), KRING_ERROR_INVALID_ARG);
    assert_eq!(kring_create(registry, name.as_ptr(), 2, 16, 256, 1, 1, KRING_HOST_IN_PROCESS), KRING_SUCCESS);
    assert_eq!(kring_create(registry, name.as_ptr(), 2, 16, 256, 1, 1, KRING_HOST_IN_PROCESS), KRING_ERROR_EXISTS);

    let mut handle = ptr::null_mut();
    assert_eq!(kring_open(registry, missing.as_ptr(), 0, KRING_MODE_READ, &mut handle), KRING_ERROR_UNKNOWN_RING_SET);
    assert_eq!(kring_open(registry, name.as_ptr(), 5, KRING_MODE_READ, &mut handle), KRING_ERROR_INVALID_RING_ID);
    assert_eq!(kring_open(registry, name.as_ptr(), -1, KRING_MODE_WRITE, &mut handle), KRING_ERROR_WRITE_TO_ALL);
    assert_eq!(kring_open(registry, name.as_ptr(), 0, 9, &mut handle), KRING_ERROR_INVALID_ARG);

    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_WRITE, &mut handle), KRING_SUCCESS);
    let mut other = ptr::null_mut();
    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_WRITE, &mut other), KRING_ERROR_WRITER_ID);
    assert_eq!(kring_avail(handle), KRING_ERROR_WRONG_MODE);
    assert_eq!(kring_wait(handle, 0), KRING_ERROR_WRONG_MODE);
    kring_close(handle);

    assert_eq!(kring_open(registry, name.as_ptr(), 1, KRING_MODE_READ, &mut handle), KRING_SUCCESS);
    assert_eq!(kring_wait(handle, 10), KRING_ERROR_TIMED_OUT);
    assert_eq!(kring_write_plain(handle, ptr::null(), 0), KRING_ERROR_WRONG_MODE as i64);
    kring_close(handle);

    assert_eq!(kring_open(ptr::null_mut(), name.as_ptr(), 0, KRING_MODE_READ, &mut handle), KRING_ERROR_NULL_POINTER);
    kring_registry_free(registry);
}

#[test]
fn test_ffi_two_phase_and_typed_writes() {
    let registry = kring_registry_new();
    let name = CString::new("ffi_typed").unwrap();
    assert_eq!(
        kring_create(registry, name.as_ptr(), 1, 16, 256, 1, 1, KRING_HOST_IN_PROCESS),
        KRING_SUCCESS
    );
    let mut writer = ptr::null_mut();
    let mut reader = ptr::null_mut();
    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_WRITE, &mut writer), KRING_SUCCESS);
    assert_eq!(kring_open(registry, name.as_ptr(), 0, KRING_MODE_READ, &mut reader), KRING_SUCCESS);

    // Nothing reserved yet.
    assert_eq!(kring_write_second(writer, 4), KRING_ERROR_INVALID_ARG as i64);

    let mut area: *mut u8 = ptr::null_mut();
    let mut cap = 0usize;
    assert_eq!(kring_write_first(writer, &mut area, &mut cap), KRING_SUCCESS);
    assert!(cap > 0 && cap < 256);
    unsafe { ptr::copy_nonoverlapping(b"in place".as_ptr(), area, 8) };
    // Not visible before the second phase.
    assert_eq!(kring_avail(reader), 0);
    assert_eq!(kring_write_second(writer, 8), 8);

    let host = CString::new("example.org").unwrap();
    assert_eq!(kring_write_packet(writer, KRING_DIR_SERVER, b"pkt".as_ptr(), 3), 3);
    assert_eq!(kring_write_packet(writer, 9, b"pkt".as_ptr(), 3), KRING_ERROR_INVALID_ARG as i64);
    assert_eq!(kring_write_decrypted(writer, 42, 1, host.as_ptr(), b"dec".as_ptr(), 3), 3);
    assert_eq!(kring_write_decrypted(writer, 43, 2, ptr::null(), ptr::null(), 0), 0);

    let mut buf = [0u8; 256];
    let mut got = Vec::new();
    loop {
        let mut len = buf.len();
        match kring_next_plain(reader, buf.as_mut_ptr(), &mut len) {
            KRING_SUCCESS => got.push(buf[..len].to_vec()),
            code => {
                assert_eq!(code, KRING_ERROR_EMPTY);
                break;
            }
        }
    }
    assert_eq!(got, vec![b"in place".to_vec(), b"pkt".to_vec(), b"dec".to_vec(), Vec::new()]);

    kring_close(writer);
    kring_close(reader);
    kring_registry_free(registry);
}

#[test]
fn test_ffi_control_channel() {
    let registry = kring_registry_new();
    let name = CString::new("ffi_ctl").unwrap();
    assert_eq!(
        kring_control_create(registry, name.as_ptr(), 2, 256, 1, KRING_HOST_IN_PROCESS),
        KRING_SUCCESS
    );

    let mut writer = ptr::null_mut();
    let mut reader = ptr::null_mut();
    let mut second = ptr::null_mut();
    assert_eq!(kring_control_open(registry, name.as_ptr(), KRING_MODE_WRITE, &mut writer), KRING_SUCCESS);
    assert_eq!(kring_control_open(registry, name.as_ptr(), KRING_MODE_READ, &mut reader), KRING_SUCCESS);
    assert_eq!(kring_control_open(registry, name.as_ptr(), KRING_MODE_READ, &mut second), KRING_ERROR_READER_ID);

    assert_eq!(kring_control_wait(reader, 10), KRING_ERROR_TIMED_OUT);
    assert_eq!(kring_control_send(writer, b"first message".as_ptr(), 13), KRING_SUCCESS);
    assert_eq!(kring_control_send(writer, b"second".as_ptr(), 6), KRING_SUCCESS);
    assert_eq!(kring_control_send(writer, b"third".as_ptr(), 5), KRING_ERROR_FULL);
    assert_eq!(kring_control_wait(reader, 10), KRING_SUCCESS);

    let mut small = [0u8; 4];
    let mut len = small.len();
    assert_eq!(kring_control_read(reader, small.as_mut_ptr(), &mut len), KRING_ERROR_INVALID_ARG);
    assert_eq!(len, 13);

    let mut buf = [0u8; 64];
    len = buf.len();
    assert_eq!(kring_control_read(reader, buf.as_mut_ptr(), &mut len), KRING_SUCCESS);
    assert_eq!(&buf[..len], b"first message");
    len = buf.len();
    assert_eq!(kring_control_read(reader, buf.as_mut_ptr(), &mut len), KRING_SUCCESS);
    assert_eq!(&buf[..len], b"second");
    len = buf.len();
    assert_eq!(kring_control_read(reader, buf.as_mut_ptr(), &mut len), KRING_ERROR_EMPTY);

    // Nodes return to the free list as the reader moves on.
    assert_eq!(kring_control_send(writer, b"again".as_ptr(), 5), KRING_SUCCESS);
    assert_eq!(kring_control_read(writer, buf.as_mut_ptr(), &mut len), KRING_ERROR_WRONG_MODE);

    kring_control_close(writer);
    kring_control_close(reader);
    assert_eq!(kring_teardown(registry, name.as_ptr()), KRING_SUCCESS);
    kring_registry_free(registry);
}
