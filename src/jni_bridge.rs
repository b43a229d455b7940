//! JNI entry points for `com.jedparsons.metronome.player.RealMetronomePlayer`.
//!
//! The Kotlin side owns an opaque `long` handle returned by
//! `createPlayerNative` and passes it to every call; `releasePlayerNative`
//! frees it. Lifecycle calls lock the player, while trigger, gain and the
//! reset flag go through the lock-free [`PlayerControl`].

use std::sync::{Mutex, MutexGuard};

use jni::objects::{JByteArray, JObject};
use jni::sys::{jboolean, jfloat, jint, jlong, JNI_FALSE, JNI_TRUE};
use jni::{JNIEnv, JavaVM};

use crate::config::AppConfig;
use crate::engine::{MetronomePlayer, OboeBackend, PlayerControl};
use crate::logging::init_logging;

struct PlayerHandle {
    player: Mutex<MetronomePlayer<OboeBackend>>,
    control: PlayerControl,
}

impl PlayerHandle {
    fn player(&self) -> MutexGuard<'_, MetronomePlayer<OboeBackend>> {
        match self.player.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Borrow the handle behind a `long` from Kotlin.
///
/// # Safety
/// `handle` must be 0 or a value returned by `createPlayerNative` that has
/// not been passed to `releasePlayerNative`.
unsafe fn handle_ref<'a>(handle: jlong) -> Option<&'a PlayerHandle> {
    (handle as *const PlayerHandle).as_ref()
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// Called when the native library is loaded. Oboe needs the Android
/// context before any stream is opened.
#[no_mangle]
pub extern "system" fn JNI_OnLoad(vm: JavaVM, _reserved: *mut std::ffi::c_void) -> jint {
    init_logging();
    tracing::info!("JNI_OnLoad called - initializing Android context");

    // SAFETY: the JavaVM pointer is valid for the lifetime of the process.
    let vm = match unsafe { JavaVM::from_raw(vm.get_java_vm_pointer()) } {
        Ok(vm) => vm,
        Err(err) => {
            tracing::error!("Failed to wrap JavaVM: {:?}", err);
            return jni::sys::JNI_ERR;
        }
    };
    let ctx = ndk_context::AndroidContext::new_with_vm(vm);
    // SAFETY: called once, before any Oboe operation.
    unsafe {
        ndk_context::initialize_android_context(ctx.vm(), ctx.context());
    }

    tracing::info!("Android context initialized");
    jni::sys::JNI_VERSION_1_6
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_createPlayerNative(
    _env: JNIEnv,
    _this: JObject,
) -> jlong {
    init_logging();
    let config = AppConfig::load_android();
    let player = MetronomePlayer::new(config.engine);
    let control = player.control();
    let handle = Box::new(PlayerHandle {
        player: Mutex::new(player),
        control,
    });
    Box::into_raw(handle) as jlong
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_releasePlayerNative(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    if handle != 0 {
        // SAFETY: the handle came from Box::into_raw in createPlayerNative
        // and Kotlin releases it exactly once.
        drop(unsafe { Box::from_raw(handle as *mut PlayerHandle) });
    }
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_setupAudioStreamNative(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
    num_channels: jint,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    tracing::info!("setupAudioStream({})", num_channels);
    let channels = u16::try_from(num_channels).unwrap_or(0);
    handle.player().setup_audio_stream(channels);
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_startAudioStreamNative(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    handle.player().start_stream();
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_teardownAudioStreamNative(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    handle.player().teardown_audio_stream();
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_loadWavAssetNative(
    env: JNIEnv,
    _this: JObject,
    handle: jlong,
    bytes: JByteArray,
    channels: jint,
) -> jboolean {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return JNI_FALSE };

    let data = match env.convert_byte_array(&bytes) {
        Ok(data) => data,
        Err(err) => {
            tracing::error!("Failed to copy WAV bytes from Java: {:?}", err);
            return JNI_FALSE;
        }
    };
    let expected = u16::try_from(channels).unwrap_or(0);
    to_jboolean(handle.player().load_wav_asset(&data, expected))
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_unloadWavAssetsNative(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    handle.player().unload_sample_data();
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_trigger(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    if let Err(err) = handle.control.trigger_down(0) {
        tracing::warn!("trigger failed: {}", err);
    }
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_getOutputReset(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) -> jboolean {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return JNI_FALSE };
    to_jboolean(handle.control.get_output_reset())
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_clearOutputReset(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    handle.control.clear_output_reset();
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_restartStream(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    if handle.player().restart_stream() {
        tracing::info!("openStream successful");
    } else {
        tracing::error!("openStream failed");
    }
}

#[no_mangle]
pub extern "system" fn Java_com_jedparsons_metronome_player_RealMetronomePlayer_setAudioGain(
    _env: JNIEnv,
    _this: JObject,
    handle: jlong,
    gain: jfloat,
) {
    let Some(handle) = (unsafe { handle_ref(handle) }) else { return };
    if let Err(err) = handle.control.set_gain_at(0, gain) {
        tracing::warn!("setAudioGain failed: {}", err);
    }
}
