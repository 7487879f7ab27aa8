//! Redis tier behaviour against a minimal RESP server that serves reads but
//! refuses writes, the way a server at `maxmemory` with `noeviction` or a
//! read-only replica does.

use chatcache::{
    CacheConfig, CacheEntry, CacheKey, DistributedCacheEntry, EvictionPolicy, HybridCache,
    LocalCache, RedisConfig, RedisTier, RemoteLookup, RemoteStore, ResponseSource,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::OwnedReadHalf;

const OOM_REPLY: &[u8] = b"-OOM command not allowed when used memory > 'maxmemory'.\r\n";

/// Serve every GET with `record` and reject every SET. Returns the port.
async fn spawn_read_only_redis(record: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let record = Arc::new(record);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let record = record.clone();
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut reader = BufReader::new(read);
                while let Some(args) = read_command(&mut reader).await {
                    if write.write_all(&reply(&args, &record)).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    port
}

async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<Vec<u8>>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        args.push(buf);
    }
    Some(args)
}

fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

fn reply(args: &[Vec<u8>], record: &[u8]) -> Vec<u8> {
    let name = args
        .first()
        .map(|a| String::from_utf8_lossy(a).to_ascii_uppercase())
        .unwrap_or_default();
    match name.as_str() {
        "PING" => match args.get(1) {
            Some(message) => bulk(message),
            None => b"+PONG\r\n".to_vec(),
        },
        "GET" => bulk(record),
        "SET" => OOM_REPLY.to_vec(),
        _ => b"+OK\r\n".to_vec(),
    }
}

fn stored_record() -> Vec<u8> {
    let entry = CacheEntry::new("cached answer", ResponseSource::KnowledgeBase);
    DistributedCacheEntry::from_entry(&entry, "node-a")
        .to_bytes()
        .expect("encode record")
}

fn redis_config(port: u16) -> RedisConfig {
    RedisConfig {
        url: format!("redis://127.0.0.1:{port}"),
        timeout_ms: 1000,
        health_check_interval_secs: 60,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_refused_access_write_back_still_returns_hit() {
    let port = spawn_read_only_redis(stored_record()).await;
    let tier = RedisTier::new(&redis_config(port), EvictionPolicy::Lru, 0.8).expect("tier");

    assert!(tier.ping().await);
    match tier.get(&CacheKey::from_raw("k")).await {
        RemoteLookup::Hit(record) => {
            assert_eq!(record.value, "cached answer");
            assert_eq!(record.node_id, "node-a");
            assert_eq!(record.access_count, 1);
        }
        other => panic!("expected a hit, got {other:?}"),
    }

    let stats = tier.snapshot();
    assert!(stats.reachable);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn test_hybrid_warms_from_read_only_remote_and_stays_available() {
    let port = spawn_read_only_redis(stored_record()).await;
    let config = redis_config(port);
    let tier = RedisTier::new(&config, EvictionPolicy::Lru, 0.8).expect("tier");
    let cache = HybridCache::new(
        LocalCache::new(&CacheConfig::default()),
        Arc::new(tier),
        &config,
        "node-b",
    );
    assert!(cache.check_health().await);

    let key = CacheKey::from_query("how do I reset my password", None);
    let hit = cache.get(&key).await.expect("served from L2");
    assert_eq!(hit.value, "cached answer");
    assert!(cache.is_remote_available());
    assert!(cache.local().contains(&key), "L2 hit warms L1");
}
